pub mod board {
    pub mod position;
    pub mod bitboard;
    pub mod zobrist;
}

pub mod eval {
    pub mod psqt;
}

pub mod movegen {
    pub mod attacks;
    pub mod moves;
    pub mod legal_moves;
}

pub mod search {
    pub mod see;
}

/// One-time setup of every global table. Idempotent.
pub fn init() {
    board::zobrist::init_zobrist();
    movegen::attacks::init_attacks();
}
