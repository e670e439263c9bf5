//! File-level pack pipeline: write, validate, corrupt, recover, merge, index.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use castellan::board::{Board, GenKind};
use castellan::nnue::StateInfo;
use castellan::pack::{
    self, pos_chain_hash, ChainReader, MoveScore, PackIndex, PosChain, DRAW,
};
use rand::prelude::*;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("castellan_{name}_{}", std::process::id()))
}

fn random_chain(seed: u64, plies: usize) -> PosChain {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Board::start_pos();
    let mut b = start;
    let mut si = StateInfo::default();
    let mut chain = PosChain::from_game(&start, DRAW);

    for _ in 0..plies {
        let moves = b.generate(GenKind::Legal);
        if moves.is_empty() {
            break;
        }
        let mv = moves.get(rng.gen_range(0..moves.len())).unwrap();
        chain.seq.push(MoveScore {
            mv,
            score: rng.gen_range(-1500i16..=1500),
        });
        b = b.do_move(mv, &mut si);
    }
    chain
}

fn write_pack(path: &PathBuf, seeds: std::ops::Range<u64>) -> u64 {
    let mut f = File::create(path).unwrap();
    let mut hash = 0u64;
    for seed in seeds {
        let chain = random_chain(seed, 80);
        hash ^= pos_chain_hash(&chain).unwrap();
        f.write_all(&chain.encode().unwrap()).unwrap();
    }
    hash
}

#[test]
fn validate_pack_files() {
    let bin = temp_path("val.bin");
    let hash_file = temp_path("val.hash");

    let hash = write_pack(&bin, 0..4);
    pack::write_hash_file(&hash_file, hash).unwrap();
    assert!(pack::validate_pack(&bin, &hash_file).unwrap());

    pack::write_hash_file(&hash_file, hash ^ 0xF00D).unwrap();
    assert!(!pack::validate_pack(&bin, &hash_file).unwrap());

    let _ = std::fs::remove_file(bin);
    let _ = std::fs::remove_file(hash_file);
}

#[test]
fn corrupt_byte_then_recover() {
    let bin = temp_path("rec_in.bin");
    let hash_file = temp_path("rec_in.hash");
    let out_bin = temp_path("rec_out.bin");
    let out_hash = temp_path("rec_out.hash");

    let hash = write_pack(&bin, 10..18);
    pack::write_hash_file(&hash_file, hash).unwrap();

    // Flip one byte somewhere in the middle.
    let mut data = std::fs::read(&bin).unwrap();
    let victim = data.len() / 3;
    data[victim] ^= 0x11;
    File::create(&bin).unwrap().write_all(&data).unwrap();

    assert!(!pack::validate_pack(&bin, &hash_file).unwrap());

    let n_pos = pack::recover_pack(bin.as_path(), out_bin.as_path(), out_hash.as_path()).unwrap();
    // All surviving chains re-validate against the recomputed hash.
    assert!(pack::validate_pack(&out_bin, &out_hash).unwrap());
    let recovered = std::fs::read(&out_bin).unwrap();
    assert!(!recovered.is_empty());
    assert!(n_pos > 0);

    for p in [bin, hash_file, out_bin, out_hash] {
        let _ = std::fs::remove_file(p);
    }
}

#[test]
fn merge_concatenates_and_folds_hashes() {
    let a_bin = temp_path("merge_a.bin");
    let a_hash = temp_path("merge_a.hash");
    let b_bin = temp_path("merge_b.bin");
    let b_hash = temp_path("merge_b.hash");
    let out_bin = temp_path("merge_out.bin");
    let out_hash = temp_path("merge_out.hash");

    let ha = write_pack(&a_bin, 20..23);
    pack::write_hash_file(&a_hash, ha).unwrap();
    let hb = write_pack(&b_bin, 30..33);
    pack::write_hash_file(&b_hash, hb).unwrap();

    let inputs = [
        (a_bin.as_path(), a_hash.as_path()),
        (b_bin.as_path(), b_hash.as_path()),
    ];
    pack::merge_packs(&inputs, &out_bin, &out_hash).unwrap();

    assert_eq!(pack::read_hash_file(&out_hash).unwrap(), ha ^ hb);
    assert!(pack::validate_pack(&out_bin, &out_hash).unwrap());

    for p in [a_bin, a_hash, b_bin, b_hash, out_bin, out_hash] {
        let _ = std::fs::remove_file(p);
    }
}

#[test]
fn index_round_trips_through_disk() {
    let bin = temp_path("idx.bin");
    let idx = temp_path("idx.idx");

    write_pack(&bin, 40..44);
    assert!(pack::create_index(&bin, &idx).unwrap());

    let index = PackIndex::read_from(&mut std::fs::read(&idx).unwrap().as_slice()).unwrap();
    let expected: u64 = (40..44u64)
        .map(|s| random_chain(s, 80).seq.len() as u64)
        .sum();
    assert_eq!(index.total_positions(), expected);

    // Block offsets chain together and end at the file size.
    let file_len = std::fs::metadata(&bin).unwrap().len();
    assert_eq!(index.blocks.last().unwrap().off_end, file_len);
    for pair in index.blocks.windows(2) {
        assert_eq!(pair[0].off_end, pair[1].off_begin);
    }

    let _ = std::fs::remove_file(bin);
    let _ = std::fs::remove_file(idx);
}

#[test]
fn chains_decode_identically_from_disk() {
    let bin = temp_path("roundtrip.bin");
    write_pack(&bin, 50..53);

    let data = std::fs::read(&bin).unwrap();
    let mut reader = ChainReader::new(&data);
    for seed in 50..53u64 {
        let decoded = reader.read_chain().unwrap();
        assert_eq!(decoded, random_chain(seed, 80), "seed {seed}");
    }

    let _ = std::fs::remove_file(bin);
}
