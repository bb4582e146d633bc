/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the U Language Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Compiler driver: `uc <input.u> [-o <out>] [--dump] [--tokens] [--no-verify]`.

use std::env;
use std::fs;
use std::process::ExitCode;

use u_lang::{dump, encoder, lexer, parser};

struct Options {
    input: String,
    output: String,
    dump: bool,
    tokens: bool,
    verify: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args().skip(1);
    let mut input = None;
    let mut output = "a.out".to_string();
    let mut dump = false;
    let mut tokens = false;
    let mut verify = true;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => {
                output = args
                    .next()
                    .ok_or_else(|| "-o needs an output path".to_string())?;
            }
            "--dump" => dump = true,
            "--tokens" => tokens = true,
            "--no-verify" => verify = false,
            _ if arg.starts_with('-') => return Err(format!("unknown flag `{}`", arg)),
            _ => {
                if input.is_some() {
                    return Err(format!("unexpected extra argument `{}`", arg));
                }
                input = Some(arg);
            }
        }
    }

    let input = input.ok_or_else(|| "input file must be provided".to_string())?;
    Ok(Options {
        input,
        output,
        dump,
        tokens,
        verify,
    })
}

fn run(opts: &Options) -> Result<(), String> {
    let source = fs::read_to_string(&opts.input)
        .map_err(|e| format!("failed to read `{}`: {}", opts.input, e))?;

    if opts.tokens {
        let tokens = lexer::Lexer::new(&source)
            .tokenize()
            .map_err(|e| e.to_string())?;
        for token in &tokens {
            println!("{}:{}: {:?}", token.line, token.col, token.kind);
        }
    }

    let module = parser::parse(&source).map_err(|e| e.to_string())?;

    if opts.dump {
        print!("{}", dump::dump_module(&module));
    }

    let bytes = encoder::encode_module(&module).map_err(|e| e.to_string())?;

    if opts.verify {
        wasmparser::validate(&bytes).map_err(|e| format!("emitted module is invalid: {}", e))?;
    }

    eprintln!("INFO: Writing to {}", opts.output);
    fs::write(&opts.output, &bytes)
        .map_err(|e| format!("failed to write `{}`: {}", opts.output, e))?;

    Ok(())
}

fn main() -> ExitCode {
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Usage: uc <input.u> [-o <out>] [--dump] [--tokens] [--no-verify]");
            return ExitCode::FAILURE;
        }
    };

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}
