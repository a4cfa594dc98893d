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
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Print the format of trace files
    Detect {
        // Input file(s)
        #[arg(group = "input", required = true, help = "Input file(s)")]
        input_files: Vec<PathBuf>,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Print a summary of decoded trace files
    Info {
        // Input file(s)
        #[arg(group = "input", required = true, help = "Input file(s)")]
        input_files: Vec<PathBuf>,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Convert between supported formats
    Convert {
        // Input file
        #[arg(group = "input", required = true, help = "Input file")]
        input_file: PathBuf,

        // Output file path, defaults to the input path with the extension of `format`
        #[arg(short = 'o', long = "output", required = false)]
        out_file: Option<PathBuf>,

        // Output format, defaults to ZTR
        #[arg(long = "format", default_value = "ztr", help = "Output format: ztr, scf or ab1")]
        format: String,

        // SCF version to write
        #[arg(long = "scf-version", default_value_t = 3, help = "SCF version: 2 or 3")]
        scf_version: u8,

        // Bytes per SCF sample
        #[arg(long = "sample-width", default_value = "auto", help = "SCF sample width: auto, 1 or 2")]
        sample_width: String,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },
}
