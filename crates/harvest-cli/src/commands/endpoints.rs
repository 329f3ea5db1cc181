use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use console::style;
use harvest_core::output::write_json_atomic;

use super::Context;
use crate::ui;

pub fn list(ctx: &Context) -> Result<()> {
    ui::header("Endpoints");
    for endpoint in ctx.registry.list() {
        println!(
            "  {:<22} {} {}",
            style(endpoint.name).cyan(),
            endpoint.method.as_str(),
            endpoint.path_template
        );
        ui::hint(&format!("  {}", endpoint.description));
        if !endpoint.required.is_empty() {
            ui::hint(&format!("  required: {}", endpoint.required.join(", ")));
        }
        if !endpoint.optional.is_empty() {
            ui::hint(&format!("  optional: {}", endpoint.optional.join(", ")));
        }
    }
    println!();
    Ok(())
}

/// Run a single request through the retrying executor and save the body
/// under `raw/`.
pub async fn fetch(ctx: &Context, name: &str, raw_params: &[String]) -> Result<()> {
    let params = parse_params(raw_params)?;
    let request = ctx.registry.get(name)?.render(&params)?;
    let executor = ctx.executor()?;

    let pb = ui::spinner(&format!("Fetching {name}"));
    let response = match executor.execute(&request).await {
        Ok(response) => {
            pb.finish_and_clear();
            response
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            return Err(e.into());
        }
    };

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let path = ctx.output.raw_path(name, &stamp);
    write_json_atomic(&path, &response.body)?;

    ui::success(&format!("{name}: {} attempt(s)", response.attempts));
    ui::hint(&path.display().to_string());
    Ok(())
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("parameter must be key=value: {pair}"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(anyhow!("parameter name is empty: {pair}"));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["userId=u1".to_string(), "q=a=b".to_string()]).unwrap();
        assert_eq!(params["userId"], "u1");
        assert_eq!(params["q"], "a=b");
        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=x".to_string()]).is_err());
    }
}
