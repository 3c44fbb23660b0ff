use crate::AppState;
use anyhow::{Context, Result};
use log::{info, warn};
use std::process::ExitCode;

/// Pretty JSON for the lookup of `token`, taken exactly as given.
fn render(state: &AppState, token: &str) -> Result<Option<String>> {
    let Some(response) = state.dictionary.lookup_with_decomposition(token) else {
        return Ok(None);
    };
    if let Some(pieces) = &response.decomposition {
        info!("'{}' decomposed into {} pieces", token, pieces.len());
    }
    let json =
        serde_json::to_string_pretty(&response).context("Failed to serialize lookup response")?;
    Ok(Some(json))
}

pub fn lookup(state: &AppState, token: &str) -> Result<ExitCode> {
    match render(state, token)? {
        Some(json) => {
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            warn!("No dictionary entries for '{}'", token);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::get_default_settings;
    use tempfile::TempDir;

    fn app_state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dictionary.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "simplified": "你好", "traditional": "你好", "pinyin": "ni3 hao3"}]"#,
        )
        .unwrap();
        let mut settings = get_default_settings();
        settings.dictionary_path = path;
        let state = AppState::initialize(settings).unwrap();
        (dir, state)
    }

    #[test]
    fn test_token_is_looked_up_verbatim() {
        let (_dir, state) = app_state();
        let json = render(&state, "你好").unwrap().unwrap();
        assert!(json.contains("\"ni3 hao3\""));
        assert!(!json.contains("decomposition"));

        // Surrounding whitespace is part of the key: no entry, so the
        // token is decomposed and the space piece stays visible.
        let json = render(&state, " 你好").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["decomposition"], serde_json::json!([" ", "你好"]));
    }
}
