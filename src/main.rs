// tracecodec: Decoding and encoding of ZTR, SCF and AB1 sequencing traces.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::path::Path;
use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;

use tracecodec::format::TraceFormat;
use tracecodec::scf::SampleWidth;
use tracecodec::scf::ScfOptions;
use tracecodec::scf::ScfVersion;
use tracecodec::EncodeOptions;

mod cli;

type E = Box<dyn std::error::Error>;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

fn parse_sample_width(width: &str) -> Result<Option<SampleWidth>, E> {
    match width {
        "auto" => Ok(None),
        "1" => Ok(Some(SampleWidth::One)),
        "2" => Ok(Some(SampleWidth::Two)),
        _ => Err(format!("'{}' is not a valid sample width", width).into()),
    }
}

fn detect(input_files: &[PathBuf]) -> Result<(), E> {
    for file in input_files {
        let mut conn_in = File::open(file)?;
        let format = tracecodec::detect_from_read(&mut conn_in)?;
        let name = format.map(|x| x.name()).unwrap_or("unknown");
        println!("{}\t{}", file.display(), name);
    }
    Ok(())
}

fn info(input_files: &[PathBuf]) -> Result<(), E> {
    for file in input_files {
        let bytes = std::fs::read(file)?;
        let name = tracecodec::format::sniff(&bytes).map(|x| x.name()).unwrap_or("unknown");
        let decoded = tracecodec::decode_from_read(&mut bytes.as_slice())?;
        println!("{}\t{}\t{}\tskipped: {}", file.display(), name, decoded.trace.summary(), decoded.skipped.len());
    }
    Ok(())
}

fn convert(
    input_file: &Path,
    out_file: &Option<PathBuf>,
    format: TraceFormat,
    options: &EncodeOptions,
) -> Result<(), E> {
    let out_path = match out_file {
        Some(path) => path.clone(),
        None => input_file.with_extension(format.extension()),
    };
    if out_path == input_file {
        return Err(format!("output path {} is the input file", out_path.display()).into());
    }

    let mut conn_in = BufReader::new(File::open(input_file)?);
    let decoded = tracecodec::decode_from_read(&mut conn_in)?;
    for skipped in decoded.skipped.iter() {
        log::warn!("{}: skipped {}: {}", input_file.display(), skipped.context, skipped.error);
    }

    let mut conn_out = BufWriter::new(File::create(&out_path)?);
    tracecodec::encode_to_write(format, &decoded.trace, options, &mut conn_out)?;
    log::info!("Wrote {} as {}", out_path.display(), format);

    Ok(())
}

fn main() {
    let cli = cli::Cli::parse();

    // Subcommands:
    let res = match &cli.command {
        // Detect
        Some(cli::Commands::Detect {
            input_files,
            verbose,
        }) => {
            init_log(if *verbose { 3 } else { 1 });
            detect(input_files)
        },

        // Info
        Some(cli::Commands::Info {
            input_files,
            verbose,
        }) => {
            init_log(if *verbose { 3 } else { 1 });
            info(input_files)
        },

        // Convert
        Some(cli::Commands::Convert {
            input_file,
            out_file,
            format,
            scf_version,
            sample_width,
            verbose,
        }) => {
            init_log(if *verbose { 3 } else { 1 });
            format.parse::<TraceFormat>().map_err(E::from)
                .and_then(|format| {
                    let version = ScfVersion::from_u8(*scf_version)?;
                    let sample_width = parse_sample_width(sample_width)?;
                    let options = EncodeOptions{ scf: ScfOptions{ version, sample_width } };
                    convert(input_file, out_file, format, &options)
                })
        },
        None => {
            cli::Cli::command().print_help().map_err(E::from)
        },
    };

    if let Err(e) = res {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
