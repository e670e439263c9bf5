//! Command-line entry points.
//!
//! Without a subcommand the binary speaks UCI on stdin/stdout. The
//! subcommands drive self-play generation and the pack tooling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{value_parser, Arg, ArgMatches, Command};

use crate::nnue::{Evaluator, Network};
use crate::pack;
use crate::selfplay::{selfplay, SelfplayConfig};
use crate::tt::{TranspositionTable, TT_DEFAULT_MB};
use crate::uci::UciContext;

fn build_command() -> Command {
    Command::new("castellan")
        .about("chess engine, self-play generator and pack tooling")
        .arg(
            Arg::new("evalfile")
                .long("evalfile")
                .value_parser(value_parser!(PathBuf))
                .help("Quantized network weights to load at startup"),
        )
        .subcommand(
            Command::new("selfplay")
                .about("Generate self-play games into <out>.bin / <out>.hash")
                .arg(Arg::new("out").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("num_pos").required(true).value_parser(value_parser!(u64)))
                .arg(Arg::new("min_depth").required(true).value_parser(value_parser!(i32)))
                .arg(Arg::new("move_time").required(true).value_parser(value_parser!(i64)))
                .arg(Arg::new("multipv").required(true).value_parser(value_parser!(usize)))
                .arg(Arg::new("max_ld_moves").required(true).value_parser(value_parser!(usize)))
                .arg(Arg::new("threads").required(true).value_parser(value_parser!(usize))),
        )
        .subcommand(
            Command::new("packval")
                .about("Validate packs against their hash files")
                .arg(
                    Arg::new("files")
                        .num_args(2..)
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Pairs of <pack.bin> <pack.hash>"),
                ),
        )
        .subcommand(
            Command::new("packmerge")
                .about("Concatenate packs and fold their hashes")
                .arg(Arg::new("out_bin").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("out_hash").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("n").required(true).value_parser(value_parser!(usize)))
                .arg(
                    Arg::new("files")
                        .num_args(2..)
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("packrecover")
                .about("Salvage readable chains from a damaged pack")
                .arg(Arg::new("input").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("out_base").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("packindex")
                .about("Build a block index for a pack")
                .arg(Arg::new("pack").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("index").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("repack")
                .about("Convert a legacy move-index pack to the bit-packed format")
                .arg(Arg::new("input").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("output").required(true).value_parser(value_parser!(PathBuf))),
        )
}

fn load_evaluator(matches: &ArgMatches) -> Evaluator {
    match matches.get_one::<PathBuf>("evalfile") {
        Some(path) => match Network::load(path) {
            Ok(net) => Evaluator::Network(Arc::new(net)),
            Err(e) => {
                log::error!("could not load weights {}: {e}", path.display());
                Evaluator::Material
            }
        },
        None => Evaluator::Material,
    }
}

fn run_selfplay(matches: &ArgMatches, sub: &ArgMatches) -> i32 {
    let cfg = SelfplayConfig {
        num_pos: *sub.get_one::<u64>("num_pos").unwrap(),
        min_depth: *sub.get_one::<i32>("min_depth").unwrap(),
        move_time: *sub.get_one::<i64>("move_time").unwrap(),
        multipv: *sub.get_one::<usize>("multipv").unwrap(),
        max_ld_moves: *sub.get_one::<usize>("max_ld_moves").unwrap(),
        threads: *sub.get_one::<usize>("threads").unwrap(),
    };
    let out: &PathBuf = sub.get_one("out").unwrap();

    let tt = Arc::new(TranspositionTable::new(TT_DEFAULT_MB));
    match selfplay(out, &cfg, tt, load_evaluator(matches)) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("selfplay failed: {e}");
            1
        }
    }
}

fn run_packval(sub: &ArgMatches) -> i32 {
    let files: Vec<&PathBuf> = sub.get_many("files").unwrap().collect();
    if files.len() % 2 != 0 {
        eprintln!("packval expects pairs of <pack.bin> <pack.hash>");
        return 1;
    }

    let mut passed = 0;
    let total = files.len() / 2;
    for pair in files.chunks_exact(2) {
        let ok = matches!(pack::validate_pack(pair[0], pair[1]), Ok(true));
        println!(
            "{}\t{}\t..{}",
            pair[0].display(),
            pair[1].display(),
            if ok { "PASS" } else { "FAIL" }
        );
        passed += i32::from(ok);
    }
    println!("{passed} pass, {} fail, {total} total", total as i32 - passed);
    i32::from(passed != total as i32)
}

fn run_packmerge(sub: &ArgMatches) -> i32 {
    let out_bin: &PathBuf = sub.get_one("out_bin").unwrap();
    let out_hash: &PathBuf = sub.get_one("out_hash").unwrap();
    let n: usize = *sub.get_one("n").unwrap();
    let files: Vec<&PathBuf> = sub.get_many("files").unwrap().collect();

    if files.len() != 2 * n {
        eprintln!("expected {n} <bin> <hash> pairs, got {} paths", files.len());
        return 1;
    }

    let inputs: Vec<(&Path, &Path)> = files
        .chunks_exact(2)
        .map(|pair| (pair[0].as_path(), pair[1].as_path()))
        .collect();

    if let Err(e) = pack::merge_packs(&inputs, out_bin, out_hash) {
        log::error!("merge failed: {e}");
        return 1;
    }

    match pack::validate_pack(out_bin.as_path(), out_hash.as_path()) {
        Ok(true) => {
            println!("merge is valid");
            0
        }
        _ => {
            println!("[!] merge is invalid");
            1
        }
    }
}

fn run_packrecover(sub: &ArgMatches) -> i32 {
    let input: &PathBuf = sub.get_one("input").unwrap();
    let out_base: &PathBuf = sub.get_one("out_base").unwrap();
    let out_bin = out_base.with_extension("bin");
    let out_hash = out_base.with_extension("hash");

    match pack::recover_pack(input.as_path(), out_bin.as_path(), out_hash.as_path()) {
        Ok(n) => {
            println!("recovered {n} positions");
            0
        }
        Err(e) => {
            log::error!("recovery failed: {e}");
            1
        }
    }
}

fn run_packindex(sub: &ArgMatches) -> i32 {
    let pack_file: &PathBuf = sub.get_one("pack").unwrap();
    let index: &PathBuf = sub.get_one("index").unwrap();

    match pack::create_index(pack_file, index) {
        Ok(true) => 0,
        Ok(false) => {
            eprintln!("pack does not decode cleanly, make sure it is valid");
            1
        }
        Err(e) => {
            log::error!("indexing failed: {e}");
            1
        }
    }
}

fn run_repack(sub: &ArgMatches) -> i32 {
    let input: &PathBuf = sub.get_one("input").unwrap();
    let output: &PathBuf = sub.get_one("output").unwrap();

    match pack::repack(input, output) {
        Ok(n) => {
            println!("repacked {n} chains");
            0
        }
        Err(e) => {
            log::error!("repack failed: {e}");
            1
        }
    }
}

/// Dispatch the process. Returns the exit code.
pub fn run() -> i32 {
    let matches = build_command().get_matches();

    match matches.subcommand() {
        Some(("selfplay", sub)) => run_selfplay(&matches, sub),
        Some(("packval", sub)) => run_packval(sub),
        Some(("packmerge", sub)) => run_packmerge(sub),
        Some(("packrecover", sub)) => run_packrecover(sub),
        Some(("packindex", sub)) => run_packindex(sub),
        Some(("repack", sub)) => run_repack(sub),
        _ => {
            let mut uci = UciContext::new();
            if let Some(path) = matches.get_one::<PathBuf>("evalfile") {
                uci.preload_eval_file(path);
            }
            uci.enter_loop();
            0
        }
    }
}
