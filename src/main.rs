use std::env;
use std::time::Instant;

use riveriron::board::position::{Position, START_FEN};
use riveriron::movegen::legal_moves::perft;

fn main() {
    riveriron::init();

    let args: Vec<String> = env::args().collect();
    let fen = args.get(1).map(String::as_str).unwrap_or(START_FEN);
    let max_depth: u32 = args.get(2).and_then(|d| d.parse().ok()).unwrap_or(4);

    let mut pos = match Position::from_fen(fen) {
        Ok(pos) => pos,
        Err(err) => {
            eprintln!("invalid FEN '{}': {}", fen, err);
            std::process::exit(1);
        }
    };

    println!("{}", pos);
    println!("\n{}", pos.fen());

    for depth in 1..=max_depth {
        let start = Instant::now();
        let nodes = perft(&mut pos, depth);
        let elapsed = start.elapsed();
        let nps = nodes as u128 * 1_000_000 / elapsed.as_micros().max(1);
        println!(
            "perft({}) = {:>12}  ({:>8.3?}, {} nps)",
            depth, nodes, elapsed, nps
        );
    }
}
