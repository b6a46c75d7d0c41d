//! On-demand frame capture.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::api::ApiClient;

pub async fn execute(output: &Path, api: &ApiClient) -> Result<()> {
    let (bytes, saved_at) = api.capture().await?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} Saved {} ({} KB)",
        "✓".green(),
        output.display(),
        bytes.len().div_ceil(1024)
    );
    if let Some(path) = saved_at {
        println!("  Server copy: {}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_capture_writes_frame_into_new_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/capture"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frames").join("now.jpg");
        let api = ApiClient::new(&server.uri(), None).unwrap();

        execute(&output, &api).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9]);
    }
}
