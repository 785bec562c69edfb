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
// - speedl2x.rs file -
//
// Same as speedl, but always doubles the speed. Lectures, mostly.

use anyhow::{Context, Result};
use clap::Parser;
use speedl::{ffmpeg, postprocess, ytdlp};
use url::Url;

const SPEED: f64 = 2.0;

#[derive(Parser)]
#[clap(
    version,
    about = "Downloads a video and re-encodes it for 2x playback",
    long_about = None
)]
struct Args {
    #[clap(
        long = "keep-original",
        short = 'k',
        help = "Keeps the original download next to the re-encoded file"
    )]
    keeporiginal: bool,

    #[clap(long, short = 'v', help = "Talks more while the URL is processed")]
    verbose: bool,

    #[clap(long = "output", short = 'o', help = "Sets the output file name")]
    outputfile: Option<String>,

    #[clap(help = "Sets the input URL to use", index = 1)]
    url: String,
}

fn main() -> Result<()> {
    // Argument parsing:
    let args = Args::parse();

    // Weed out unusable input before anything hits the network:
    Url::parse(&args.url).context("This does not look like a valid URL.")?;

    let (outtmpl, output_ext) = match &args.outputfile {
        Some(name) => {
            let (tmpl, ext) = ytdlp::output_template(name);
            (Some(tmpl), ext)
        }
        None => (None, "mkv".to_string()),
    };
    let outtmpl = outtmpl.as_deref();

    // Both external tools need to be there before we waste bandwidth:
    let ytdlp_version = ytdlp::version()?;
    let ffmpeg_version = ffmpeg::version()?;
    if args.verbose {
        println!(
            "Using yt-dlp {} and ffmpeg {}.",
            ytdlp_version, ffmpeg_version
        );
    }

    if !ffmpeg::has_encoder(ffmpeg::VIDEO_ENCODER)? {
        println!(
            "Your ffmpeg does not list the {} encoder. The re-encoding will probably fail.",
            ffmpeg::VIDEO_ENCODER
        );
    }

    let video = match ytdlp::probe(&args.url, outtmpl) {
        Ok(video) => video,
        Err(err) => {
            println!("The video could not be found. Invalid link?");
            return Err(err);
        }
    };

    println!("Fetching \"{}\".", video.title);
    if args.verbose {
        println!(
            "Downloaded container: {}; target container: {}.",
            video.ext, output_ext
        );
        println!("Starting the download.");
    }

    let targetfile = ytdlp::planned_filename(&args.url, outtmpl)?;
    ytdlp::download(&args.url, outtmpl, args.verbose)?;

    if args.verbose {
        println!("Post-processing.");
    }

    let outputfile = postprocess::run(
        &targetfile,
        &output_ext,
        SPEED,
        args.keeporiginal,
        args.verbose,
    )?;

    // Success!
    println!("\"{}\" successfully downloaded.", outputfile.display());

    Ok(())
}
