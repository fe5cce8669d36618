use std::path::Path;

/// Fetch (http/https) or read (relative to `root`) an OpenAPI document.
pub async fn load_openapi(
    client: &reqwest::Client,
    location: &str,
    root: &Path,
) -> Result<serde_json::Value, String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let resp = client.get(location).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body = resp.text().await.map_err(|e| e.to_string())?;
        parse_openapi_str(&body)
    } else {
        let path = root.join(location);
        let body = std::fs::read_to_string(&path)
            .map_err(|e| format!("read {}: {e}", path.display()))?;
        parse_openapi_str(&body)
    }
}

/// JSON when the document starts with `{`, YAML otherwise.
pub fn parse_openapi_str(body: &str) -> Result<serde_json::Value, String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        serde_json::from_str::<serde_json::Value>(body).map_err(|e| e.to_string())
    } else {
        let y = serde_yaml::from_str::<serde_yaml::Value>(body).map_err(|e| e.to_string())?;
        serde_json::to_value(y).map_err(|e| e.to_string())
    }
}
