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
// - ffmpeg.rs file -

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::{
    env,
    ffi::OsString,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

// It makes very little sense to link ffmpeg statically with speedl.
// Just use the system's one (or inform the user if there isn't one).

pub const VIDEO_ENCODER: &str = "vp9_vaapi";

// A single atempo pass only takes so much. Everything else is a
// usage error, caught before any download starts.
const MIN_SPEED: f64 = 0.5;
const MAX_SPEED: f64 = 100.0;

pub fn executable() -> String {
    env::var("SPEEDL_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string())
}

pub fn validate_speed(speed: f64) -> Result<()> {
    if !speed.is_finite() || speed < MIN_SPEED || speed > MAX_SPEED {
        bail!(
            "The speed factor must be between {} and {} (got {}).",
            MIN_SPEED,
            MAX_SPEED,
            speed
        );
    }
    Ok(())
}

pub fn version() -> Result<String> {
    let output = Command::new(executable())
        .arg("-version")
        .output()
        .with_context(|| format!("Could not find {} - no processing is done.", executable()))?;

    if !output.status.success() {
        bail!("{} -version failed.", executable());
    }

    let banner = String::from_utf8_lossy(&output.stdout);
    parse_version(&banner)
        .ok_or_else(|| anyhow::anyhow!("{} printed an unexpected version banner.", executable()))
}

fn parse_version(banner: &str) -> Option<String> {
    let re = Regex::new(r"ffmpeg version (\S+)").unwrap();
    re.captures(banner).map(|cap| cap[1].to_string())
}

// The encoder list is the only way to tell in advance whether this
// ffmpeg was built with VAAPI at all.
pub fn has_encoder(name: &str) -> Result<bool> {
    let output = Command::new(executable())
        .arg("-hide_banner")
        .arg("-encoders")
        .output()
        .with_context(|| format!("Could not find {} - no processing is done.", executable()))?;

    let list = String::from_utf8_lossy(&output.stdout);
    Ok(list
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name)))
}

// The one fixed command template of this whole program: decode via
// VAAPI, divide the timestamps by <speed>, resample the audio by
// <speed>, encode back to VP9/Opus on the GPU. Only the speed value
// ever varies.
fn speed_args(inputfile: &Path, outputfile: &Path, speed: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(), // Shut the fuck up.
        "-hwaccel".into(),
        "vaapi".into(),
        "-hwaccel_output_format".into(),
        "vaapi".into(),
        "-i".into(),
    ];
    args.push(inputfile.into());
    args.push("-vf".into());
    args.push(format!("setpts=PTS/{}", speed).into());
    args.push("-af".into());
    args.push(format!("atempo={}", speed).into());
    args.push("-c:v".into());
    args.push(VIDEO_ENCODER.into());
    args.push("-c:a".into());
    args.push("libopus".into());
    args.push(outputfile.into());
    args
}

pub fn change_speed(inputfile: &Path, outputfile: &Path, speed: f64, verbose: bool) -> Result<()> {
    let args = speed_args(inputfile, outputfile, speed);

    if verbose {
        println!(
            "Executing: {} {}",
            executable(),
            args.iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    // Display a spinner (ffmpeg was told to keep quiet):
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}").unwrap(),
    );
    pb.set_message(format!("Re-encoding at {}x ...", speed));
    pb.enable_steady_tick(Duration::from_millis(100));

    let child = Command::new(executable())
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Could not find {} - no processing is done.", executable()))?;

    let output = child.wait_with_output()?;
    pb.finish_and_clear();

    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            executable(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn speed_limits() {
        assert!(validate_speed(2.0).is_ok());
        assert!(validate_speed(0.5).is_ok());
        assert!(validate_speed(100.0).is_ok());
        assert!(validate_speed(0.25).is_err());
        assert!(validate_speed(250.0).is_err());
        assert!(validate_speed(f64::NAN).is_err());
        assert!(validate_speed(f64::INFINITY).is_err());
    }

    #[test]
    fn version_banner() {
        let banner = "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers\n\
                      built with gcc 13 (GCC)\n";
        assert_eq!(parse_version(banner).as_deref(), Some("6.1.1"));
        assert_eq!(parse_version("not ffmpeg at all"), None);
    }

    #[test]
    fn command_template_is_fixed() {
        let args = speed_args(&PathBuf::from("in.webm"), &PathBuf::from("out.mkv"), 2.0);
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-hwaccel",
                "vaapi",
                "-hwaccel_output_format",
                "vaapi",
                "-i",
                "in.webm",
                "-vf",
                "setpts=PTS/2",
                "-af",
                "atempo=2",
                "-c:v",
                "vp9_vaapi",
                "-c:a",
                "libopus",
                "out.mkv",
            ]
        );
    }

    #[test]
    fn fractional_speeds_keep_their_digits() {
        let args = speed_args(&PathBuf::from("a"), &PathBuf::from("b"), 1.5);
        let vf = args[11].to_string_lossy();
        let af = args[13].to_string_lossy();
        assert_eq!(vf, "setpts=PTS/1.5");
        assert_eq!(af, "atempo=1.5");
    }
}
