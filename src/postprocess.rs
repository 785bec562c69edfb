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
// - postprocess.rs file -

use crate::ffmpeg;
use anyhow::{bail, Context, Result};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

// The whole plan, computed before anything touches the disk.
// When the target container equals the downloaded one, encoding
// straight to <output> would clobber the input, so the source moves
// to *.orig.EXT and the encoder writes *.temp.EXT first.
pub struct Plan {
    pub source: PathBuf,
    pub orig: PathBuf,
    pub temp: PathBuf,
    pub output: PathBuf,
}

pub fn replace_extension(path: &Path, new_ext: &str) -> PathBuf {
    path.with_extension(new_ext)
}

// "video.mkv" + "orig" -> "video.orig.mkv"
pub fn prepend_extension(path: &Path, affix: &str) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path.with_extension(format!("{}.{}", affix, ext)),
        None => path.with_extension(affix),
    }
}

pub fn plan(source: &Path, output_ext: &str) -> Plan {
    let output = replace_extension(source, output_ext);

    let (orig, temp) = if output == source {
        (
            prepend_extension(source, "orig"),
            prepend_extension(source, "temp"),
        )
    } else {
        (source.to_path_buf(), output.clone())
    };

    Plan {
        source: source.to_path_buf(),
        orig,
        temp,
        output,
    }
}

// Source out of the way first, then the encoded file into place.
// Both renames are no-ops when the containers differ.
fn swap_files(plan: &Plan) -> Result<()> {
    if plan.orig != plan.source {
        fs::rename(&plan.source, &plan.orig)
            .with_context(|| format!("Could not rename \"{}\".", plan.source.display()))?;
    }

    if plan.temp != plan.output {
        fs::rename(&plan.temp, &plan.output)
            .with_context(|| format!("Could not rename \"{}\".", plan.temp.display()))?;
    }

    Ok(())
}

fn apply_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(mtime)
}

pub fn run(
    source: &Path,
    output_ext: &str,
    speed: f64,
    keep_original: bool,
    verbose: bool,
) -> Result<PathBuf> {
    if !source.exists() {
        bail!("\"{}\" does not exist. Download failed?", source.display());
    }

    let plan = plan(source, output_ext);
    println!(
        "Changing speed to {}; Destination: {}",
        speed,
        plan.output.display()
    );

    // yt-dlp stamps the download with the upload date. Remember it
    // before the encoder produces a brand-new file.
    let mtime = fs::metadata(source).and_then(|meta| meta.modified()).ok();

    ffmpeg::change_speed(source, &plan.temp, speed, verbose)?;
    swap_files(&plan)?;

    if let Some(mtime) = mtime {
        if let Err(err) = apply_mtime(&plan.output, mtime) {
            // Not worth dying for.
            eprintln!(
                "Cannot update the modification time of \"{}\": {}",
                plan.output.display(),
                err
            );
        }
    }

    if !keep_original {
        // Get rid of the evidence.
        if verbose {
            println!("Removing \"{}\".", plan.orig.display());
        }
        fs::remove_file(&plan.orig)
            .with_context(|| format!("Could not remove \"{}\".", plan.orig.display()))?;
    }

    Ok(plan.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn plan_with_differing_containers() {
        let plan = plan(Path::new("video.webm"), "mkv");
        assert_eq!(plan.output, Path::new("video.mkv"));
        // Nothing collides, so no intermediate names are needed:
        assert_eq!(plan.orig, Path::new("video.webm"));
        assert_eq!(plan.temp, Path::new("video.mkv"));
    }

    #[test]
    fn plan_with_colliding_containers() {
        let plan = plan(Path::new("video.mkv"), "mkv");
        assert_eq!(plan.output, Path::new("video.mkv"));
        assert_eq!(plan.orig, Path::new("video.orig.mkv"));
        assert_eq!(plan.temp, Path::new("video.temp.mkv"));
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(
            replace_extension(Path::new("a.b.webm"), "mkv"),
            Path::new("a.b.mkv")
        );
        assert_eq!(
            replace_extension(Path::new("noext"), "mkv"),
            Path::new("noext.mkv")
        );
        assert_eq!(
            prepend_extension(Path::new("video.mkv"), "temp"),
            Path::new("video.temp.mkv")
        );
        assert_eq!(
            prepend_extension(Path::new("noext"), "orig"),
            Path::new("noext.orig")
        );
    }

    #[test]
    fn swap_keeps_both_files_apart() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("video.mkv");
        fs::write(&source, b"downloaded").unwrap();

        let plan = plan(&source, "mkv");
        fs::write(&plan.temp, b"encoded").unwrap();

        swap_files(&plan).unwrap();

        assert_eq!(fs::read(&plan.orig).unwrap(), b"downloaded");
        assert_eq!(fs::read(&plan.output).unwrap(), b"encoded");
        assert!(!plan.temp.exists());
    }

    #[test]
    fn swap_without_collision_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("video.webm");
        fs::write(&source, b"downloaded").unwrap();

        let plan = plan(&source, "mkv");
        fs::write(&plan.temp, b"encoded").unwrap();

        swap_files(&plan).unwrap();

        assert_eq!(fs::read(&plan.orig).unwrap(), b"downloaded");
        assert_eq!(fs::read(&plan.output).unwrap(), b"encoded");
    }

    #[test]
    fn mtime_travels_to_the_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("video.mkv");
        fs::write(&file, b"encoded").unwrap();

        let uploaded = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        apply_mtime(&file, uploaded).unwrap();

        let read_back = fs::metadata(&file).unwrap().modified().unwrap();
        let secs = |t: SystemTime| t.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs(read_back), secs(uploaded));
    }
}
