/*
 * The contents of this file are subject to the terms of the
 * Common Development and Distribution License, Version 1.0 only
 * (the "License").  You may not use this file except in compliance
 * with the License.
 *
 * See the file LICENSE in this distribution for details.
 * A copy of the CDDL is also available via the Internet at
 * http://www.opensource.org/licenses/cddl1.txt
 *
 * When distributing Covered Code, include this CDDL HEADER in each
 * file and include the contents of the LICENSE file from this
 * distribution.
 */

// Speedl - the speed-watching video down loader
// - ytdlp.rs file -

use anyhow::{bail, Context, Result};
use std::{
    env,
    path::PathBuf,
    process::{Command, Stdio},
};

// Downloading and extraction is yt-dlp's business, not ours.
// Just use the system's one (or inform the user if there isn't one).

pub struct VideoInfo {
    pub title: String,
    pub ext: String,
}

// The yt-dlp executable could be somewhere else entirely.
// "SPEEDL_YTDLP" lets the user point us there.
pub fn executable() -> String {
    env::var("SPEEDL_YTDLP").unwrap_or_else(|_| "yt-dlp".to_string())
}

// Every yt-dlp call uses the same selection arguments, so that
// probing, filename prediction and the actual download can never
// disagree about the format.
fn base_args(outtmpl: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--prefer-free-formats".to_string(),
    ];

    if let Some(tmpl) = outtmpl {
        args.push("-o".to_string());
        args.push(tmpl.to_string());
    }

    args
}

// Split an "-o" value into the yt-dlp output template and the target
// container extension. No extension means the default target (mkv).
pub fn output_template(name: &str) -> (String, String) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && !ext.contains('/') => {
            (format!("{}.%(ext)s", stem), ext.to_string())
        }
        _ => (format!("{}.%(ext)s", name), "mkv".to_string()),
    }
}

pub fn version() -> Result<String> {
    let output = Command::new(executable())
        .arg("--version")
        .output()
        .with_context(|| format!("Could not find {} - no download is done.", executable()))?;

    if !output.status.success() {
        bail!("{} --version failed.", executable());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn probe(url: &str, outtmpl: Option<&str>) -> Result<VideoInfo> {
    let output = Command::new(executable())
        .arg("-J")
        .args(base_args(outtmpl))
        .arg(url)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Could not find {} - no download is done.", executable()))?;

    if !output.status.success() {
        bail!(
            "{} could not process this URL: {}",
            executable(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_info(&output.stdout)
}

fn parse_info(json: &[u8]) -> Result<VideoInfo> {
    let info: serde_json::Value =
        serde_json::from_slice(json).context("yt-dlp returned unparsable JSON")?;

    let title = info["title"].as_str().unwrap_or("video").to_string();
    let ext = info["ext"].as_str().unwrap_or("mkv").to_string();

    Ok(VideoInfo { title, ext })
}

// Ask yt-dlp where the download will end up. Doing this before the
// download keeps the post-processing independent of yt-dlp's own
// filename sanitizing.
pub fn planned_filename(url: &str, outtmpl: Option<&str>) -> Result<PathBuf> {
    let output = Command::new(executable())
        .arg("--print")
        .arg("filename")
        .args(base_args(outtmpl))
        .arg(url)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Could not find {} - no download is done.", executable()))?;

    if !output.status.success() {
        bail!(
            "{} could not resolve the target file name: {}",
            executable(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let filename = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if filename.is_empty() {
        bail!("{} did not print a target file name.", executable());
    }

    Ok(PathBuf::from(filename))
}

pub fn download(url: &str, outtmpl: Option<&str>, verbose: bool) -> Result<()> {
    let mut command = Command::new(executable());
    command.args(base_args(outtmpl)).arg(url);

    if verbose {
        println!("Running: {:?}", command);
    }

    // yt-dlp draws its own progress bars; let it have the terminal.
    let status = command
        .status()
        .with_context(|| format!("Could not find {} - no download is done.", executable()))?;

    if !status.success() {
        bail!("{} exited with {}.", executable(), status);
    }

    Ok(())
}
