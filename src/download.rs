use anyhow::{Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::SUPPORTED_MODEL;
use crate::engine::ComputeType;

const MODEL_SOURCE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Weight files fetched for the supported model: float16 for GPU, int8 for CPU.
pub fn weight_files() -> Vec<String> {
    [ComputeType::Float16, ComputeType::Int8]
        .into_iter()
        .map(|compute| compute.weights_file(SUPPORTED_MODEL))
        .collect()
}

fn download_url(file_name: &str) -> String {
    format!("{MODEL_SOURCE}/{file_name}")
}

fn check_download_tool() -> Result<String> {
    let tools = ["wget2", "wget", "curl"];

    for tool in &tools {
        if Command::new("which")
            .arg(tool)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
        {
            return Ok(tool.to_string());
        }
    }

    Err(anyhow!(
        "Either wget, wget2, or curl is required to download models. Please install one of them."
    ))
}

fn download_command(tool: &str, url: &str, output_path: &Path) -> Result<Command> {
    let mut cmd = Command::new(tool);
    let output = output_path.as_os_str();

    match tool {
        "wget2" => {
            cmd.args(["--no-config", "--progress", "bar", "-O"])
                .arg(output)
                .arg(url);
        }
        "wget" => {
            cmd.args(["--no-config", "--quiet", "--show-progress", "-O"])
                .arg(output)
                .arg(url);
        }
        "curl" => {
            cmd.args(["-L", "--fail", "--output"]).arg(output).arg(url);
        }
        _ => return Err(anyhow!("Unsupported download tool: {}", tool)),
    }

    Ok(cmd)
}

fn download_with_tool(tool: &str, url: &str, output_path: &Path) -> Result<()> {
    let status = download_command(tool, url, output_path)?
        .status()
        .map_err(|e| anyhow!("Failed to execute {}: {}", tool, e))?;

    if !status.success() {
        // Remove the partial file.
        let _ = std::fs::remove_file(output_path);
        return Err(anyhow!("Download failed with {}", tool));
    }

    Ok(())
}

/// Downloads any missing weight files into `models_dir`, returning their paths.
pub fn fetch_model(models_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(models_dir)
        .map_err(|e| anyhow!("Failed to create directory {}: {}", models_dir.display(), e))?;

    let mut tool: Option<String> = None;
    let mut paths = Vec::new();

    for file_name in weight_files() {
        let file_path = models_dir.join(&file_name);
        if file_path.exists() {
            println!("Model file '{file_name}' already exists. Skipping download.");
            paths.push(file_path);
            continue;
        }

        let tool_name = match tool.clone() {
            Some(name) => name,
            None => {
                let name = check_download_tool()?;
                tool = Some(name.clone());
                name
            }
        };

        let url = download_url(&file_name);
        println!("Downloading '{file_name}' from '{MODEL_SOURCE}'...");
        debug!("Using {tool_name} for {url}");
        download_with_tool(&tool_name, &url, &file_path)?;
        println!("Done! Saved '{}'", file_path.display());
        paths.push(file_path);
    }

    println!("Finished downloading {SUPPORTED_MODEL}.");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetches_both_precisions() {
        assert_eq!(
            weight_files(),
            vec!["ggml-large-v2.bin".to_string(), "ggml-large-v2-q8_0.bin".to_string()]
        );
    }

    #[test]
    fn urls_point_at_ggml_repository() {
        assert_eq!(
            download_url("ggml-large-v2.bin"),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v2.bin"
        );
    }

    #[test]
    fn existing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        for name in weight_files() {
            std::fs::write(dir.path().join(name), b"weights").unwrap();
        }
        let paths = fetch_model(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(download_command("aria2c", "http://x", Path::new("out.bin")).is_err());
    }
}
