use std::fmt;

use thiserror::Error;

use crate::board::bitboard::*;
use crate::board::zobrist::{material_count_key, piece_square_key, side_key};
use crate::eval::psqt::{self, piece_value_mg, Score, ENDGAME_LIMIT, MIDGAME_LIMIT, PHASE_MIDGAME};
use crate::movegen::attacks::{
    aligned, attacks_bb, between_bb, cannon_attacks, chariot_attacks, elephant_attacks, horse_leg,
    passed_soldier_mask, pseudo_attacks, step_attacks,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    #[inline(always)]
    pub const fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl From<u8> for Color {
    #[inline(always)]
    fn from(n: u8) -> Self {
        if n == 0 {
            Color::White
        } else {
            Color::Black
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PieceType {
    None = 0,
    Soldier = 1,
    Horse = 2,
    Elephant = 3,
    Cannon = 4,
    Chariot = 5,
    Advisor = 6,
    General = 7,
}

impl From<u8> for PieceType {
    #[inline(always)]
    fn from(n: u8) -> Self {
        match n {
            1 => PieceType::Soldier,
            2 => PieceType::Horse,
            3 => PieceType::Elephant,
            4 => PieceType::Cannon,
            5 => PieceType::Chariot,
            6 => PieceType::Advisor,
            7 => PieceType::General,
            _ => PieceType::None,
        }
    }
}

pub type Piece = u8;

pub const NO_PIECE: Piece = 0;
pub const W_SOLDIER: Piece = 1;
pub const W_HORSE: Piece = 2;
pub const W_ELEPHANT: Piece = 3;
pub const W_CANNON: Piece = 4;
pub const W_CHARIOT: Piece = 5;
pub const W_ADVISOR: Piece = 6;
pub const W_GENERAL: Piece = 7;
pub const B_SOLDIER: Piece = 9;
pub const B_HORSE: Piece = 10;
pub const B_ELEPHANT: Piece = 11;
pub const B_CANNON: Piece = 12;
pub const B_CHARIOT: Piece = 13;
pub const B_ADVISOR: Piece = 14;
pub const B_GENERAL: Piece = 15;

pub const PIECE_NB: usize = 16;

pub const PIECES: [Piece; 14] = [
    W_SOLDIER, W_HORSE, W_ELEPHANT, W_CANNON, W_CHARIOT, W_ADVISOR, W_GENERAL, B_SOLDIER, B_HORSE,
    B_ELEPHANT, B_CANNON, B_CHARIOT, B_ADVISOR, B_GENERAL,
];

const PIECE_TO_CHAR: &str = " PNBCRAK pnbcrak";

#[inline(always)]
pub const fn make_piece(c: Color, pt: PieceType) -> Piece {
    ((c as u8) << 3) | pt as u8
}

#[inline(always)]
pub fn type_of(pc: Piece) -> PieceType {
    PieceType::from(pc & 7)
}

#[inline(always)]
pub fn color_of(pc: Piece) -> Color {
    Color::from(pc >> 3)
}

pub const MAX_MOVES: usize = 256;
pub const MAX_PLY: usize = 128;

/// Move encoding: `to` in bits 0..6, `from` in bits 7..13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Move(pub u16);

impl Move {
    pub const NONE: Move = Move(0);
    pub const NULL: Move = Move(91);

    #[inline(always)]
    pub const fn new(from: Square, to: Square) -> Move {
        Move(((from as u16) << 7) | to as u16)
    }

    #[inline(always)]
    pub const fn from(self) -> Square {
        ((self.0 >> 7) & 0x7F) as Square
    }

    #[inline(always)]
    pub const fn to(self) -> Square {
        (self.0 & 0x7F) as Square
    }

    /// Catches both MOVE_NONE and MOVE_NULL.
    #[inline(always)]
    pub const fn is_ok(self) -> bool {
        self.from() != self.to()
    }
}

impl Default for Move {
    #[inline(always)]
    fn default() -> Self {
        Move::NONE
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FenError {
    #[error("malformed FEN string")]
    Malformed,
    #[error("unknown piece letter '{0}'")]
    InvalidPiece(char),
    #[error("piece placement leaves the board")]
    Overflow,
    #[error("invalid side-to-move field")]
    InvalidSideToMove,
    #[error("illegal count for piece '{0}'")]
    InvalidPieceCount(char),
    #[error("soldier on its own back rank")]
    SoldierOnBackRank,
}

/// Everything needed to take a move back, plus the derived check state of the
/// position after it. One entry per ply, stacked inside the Position.
#[derive(Clone)]
pub struct StateInfo {
    // Carried over on do_move
    pub pawn_key: u64,
    pub material_key: u64,
    pub non_pawn_material: [i32; 2],
    pub plies_from_null: i32,
    pub psq: Score,

    // Recomputed after every move
    pub key: u64,
    pub checkers_bb: Bitboard,
    pub captured_piece: Piece,
    pub captured_index: u8,
    pub blockers_for_king: [Bitboard; 2],
    pub pinners_for_king: [Bitboard; 2],
    pub fixed_pinned: [Bitboard; 2],
    pub check_squares: [Bitboard; 8],
}

impl StateInfo {
    pub fn new() -> StateInfo {
        StateInfo {
            pawn_key: 0,
            material_key: 0,
            non_pawn_material: [0; 2],
            plies_from_null: 0,
            psq: Score::zero(),
            key: 0,
            checkers_bb: EMPTY,
            captured_piece: NO_PIECE,
            captured_index: 0,
            blockers_for_king: [EMPTY; 2],
            pinners_for_king: [EMPTY; 2],
            fixed_pinned: [EMPTY; 2],
            check_squares: [EMPTY; 8],
        }
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        Self::new()
    }
}

pub const START_FEN: &str = "rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR w - - 0 1";

pub struct Position {
    board: [Piece; 90],
    by_type_bb: [Bitboard; 8],
    by_color_bb: [Bitboard; 2],
    piece_count: [i32; PIECE_NB],
    piece_list: [[Square; 16]; PIECE_NB],
    index: [u8; 90],
    side_to_move: Color,
    game_ply: i32,
    nodes: u64,
    states: Vec<StateInfo>,
}

impl Position {
    fn empty_position() -> Position {
        let mut states = Vec::with_capacity(MAX_PLY);
        states.push(StateInfo::new());
        Position {
            board: [NO_PIECE; 90],
            by_type_bb: [EMPTY; 8],
            by_color_bb: [EMPTY; 2],
            piece_count: [0; PIECE_NB],
            piece_list: [[SQ_NONE; 16]; PIECE_NB],
            index: [0; 90],
            side_to_move: Color::White,
            game_ply: 0,
            nodes: 0,
            states,
        }
    }

    pub fn startpos() -> Position {
        Position::from_fen(START_FEN).expect("start position FEN is valid")
    }

    /// Parses the xiangqi FEN dialect: ranks 10 down to 1, `PNBCRAK` white
    /// and lowercase black, digit runs for empties, then the side to move.
    /// Legacy castling/ep/halfmove fields are consumed; fullmove is kept.
    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let mut pos = Position::empty_position();
        let mut parts = fen.split_whitespace();

        let placement = parts.next().ok_or(FenError::Malformed)?;
        let mut sq: i32 = 81; // a10
        for ch in placement.chars() {
            if let Some(d) = ch.to_digit(10) {
                if d == 0 {
                    return Err(FenError::Malformed);
                }
                sq += d as i32;
            } else if ch == '/' {
                sq -= 18;
                if sq < 0 {
                    return Err(FenError::Overflow);
                }
            } else {
                let idx = PIECE_TO_CHAR
                    .find(ch)
                    .ok_or(FenError::InvalidPiece(ch))? as Piece;
                if !(0..90).contains(&sq) {
                    return Err(FenError::Overflow);
                }
                pos.put_piece(idx, sq as Square);
                sq += 1;
            }
        }

        pos.side_to_move = match parts.next() {
            Some("w") => Color::White,
            Some("b") => Color::Black,
            _ => return Err(FenError::InvalidSideToMove),
        };

        let _castle = parts.next();
        let _ep = parts.next();
        let _halfmove: i32 = parts.next().and_then(|t| t.parse().ok()).unwrap_or(0);
        let fullmove: i32 = parts.next().and_then(|t| t.parse().ok()).unwrap_or(1);
        pos.game_ply =
            (2 * (fullmove - 1)).max(0) + if pos.side_to_move == Color::Black { 1 } else { 0 };

        pos.validate_placement()?;
        pos.set_state();
        Ok(pos)
    }

    fn validate_placement(&self) -> Result<(), FenError> {
        for c in [Color::White, Color::Black] {
            let limits = [
                (PieceType::General, 1, 1),
                (PieceType::Soldier, 0, 5),
                (PieceType::Horse, 0, 2),
                (PieceType::Elephant, 0, 2),
                (PieceType::Cannon, 0, 2),
                (PieceType::Chariot, 0, 2),
                (PieceType::Advisor, 0, 2),
            ];
            for (pt, min, max) in limits {
                let pc = make_piece(c, pt);
                let n = self.piece_count[pc as usize];
                if n < min || n > max {
                    let ch = PIECE_TO_CHAR.as_bytes()[pc as usize] as char;
                    return Err(FenError::InvalidPieceCount(ch));
                }
            }
            for s in iter_bits(self.pieces_colored(PieceType::Soldier, c)) {
                if relative_rank_of(c as u8, s) == 0 {
                    return Err(FenError::SoldierOnBackRank);
                }
            }
        }
        Ok(())
    }

    /// FEN serialization; the tail fields are fixed legacy placeholders.
    pub fn fen(&self) -> String {
        let mut out = String::with_capacity(96);
        for r in (0..10u8).rev() {
            let mut empty_run = 0;
            for f in 0..9u8 {
                let pc = self.board[make_square(f, r) as usize];
                if pc == NO_PIECE {
                    empty_run += 1;
                } else {
                    if empty_run > 0 {
                        out.push((b'0' + empty_run) as char);
                        empty_run = 0;
                    }
                    out.push(PIECE_TO_CHAR.as_bytes()[pc as usize] as char);
                }
            }
            if empty_run > 0 {
                out.push((b'0' + empty_run) as char);
            }
            if r > 0 {
                out.push('/');
            }
        }
        out.push_str(if self.side_to_move == Color::White {
            " w "
        } else {
            " b "
        });
        out.push_str("- - 0 1");
        out
    }

    #[inline(always)]
    fn st(&self) -> &StateInfo {
        self.states.last().unwrap()
    }

    #[inline(always)]
    fn st_mut(&mut self) -> &mut StateInfo {
        self.states.last_mut().unwrap()
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn piece_at(&self, s: Square) -> Piece {
        self.board[s as usize]
    }

    #[inline(always)]
    pub fn is_empty(&self, s: Square) -> bool {
        self.board[s as usize] == NO_PIECE
    }

    #[inline(always)]
    pub fn all_pieces(&self) -> Bitboard {
        self.by_type_bb[0]
    }

    #[inline(always)]
    pub fn pieces(&self, c: Color) -> Bitboard {
        self.by_color_bb[c as usize]
    }

    #[inline(always)]
    pub fn pieces_of_type(&self, pt: PieceType) -> Bitboard {
        self.by_type_bb[pt as usize]
    }

    #[inline(always)]
    pub fn pieces_of_types(&self, pt1: PieceType, pt2: PieceType) -> Bitboard {
        self.by_type_bb[pt1 as usize] | self.by_type_bb[pt2 as usize]
    }

    #[inline(always)]
    pub fn pieces_colored(&self, pt: PieceType, c: Color) -> Bitboard {
        self.by_color_bb[c as usize] & self.by_type_bb[pt as usize]
    }

    #[inline(always)]
    pub fn count(&self, pc: Piece) -> i32 {
        self.piece_count[pc as usize]
    }

    #[inline(always)]
    pub fn piece_squares(&self, pc: Piece) -> &[Square] {
        &self.piece_list[pc as usize][..self.piece_count[pc as usize] as usize]
    }

    #[inline(always)]
    pub fn general_square(&self, c: Color) -> Square {
        self.piece_list[make_piece(c, PieceType::General) as usize][0]
    }

    #[inline(always)]
    pub fn checkers(&self) -> Bitboard {
        self.st().checkers_bb
    }

    /// Own pieces whose departure would uncover a check on the enemy general.
    #[inline(always)]
    pub fn discovered_check_candidates(&self) -> Bitboard {
        self.st().blockers_for_king[self.side_to_move.opposite() as usize]
            & self.pieces(self.side_to_move)
    }

    #[inline(always)]
    pub fn pinned_pieces(&self, c: Color) -> Bitboard {
        self.st().blockers_for_king[c as usize] & self.pieces(c)
    }

    #[inline(always)]
    pub fn blockers_for_king(&self, c: Color) -> Bitboard {
        self.st().blockers_for_king[c as usize]
    }

    #[inline(always)]
    pub fn pinners_for_king(&self, c: Color) -> Bitboard {
        self.st().pinners_for_king[c as usize]
    }

    /// Pieces of color `c` that may not move at all: they stand on the leg of
    /// an enemy horse bearing on `c`'s general.
    #[inline(always)]
    pub fn fixed_pinned(&self, c: Color) -> Bitboard {
        self.st().fixed_pinned[c as usize]
    }

    #[inline(always)]
    pub fn check_squares(&self, pt: PieceType) -> Bitboard {
        self.st().check_squares[pt as usize]
    }

    #[inline(always)]
    pub fn key(&self) -> u64 {
        self.st().key
    }

    #[inline(always)]
    pub fn pawn_key(&self) -> u64 {
        self.st().pawn_key
    }

    #[inline(always)]
    pub fn material_key(&self) -> u64 {
        self.st().material_key
    }

    #[inline(always)]
    pub fn psq_score(&self) -> Score {
        self.st().psq
    }

    #[inline(always)]
    pub fn non_pawn_material(&self, c: Color) -> i32 {
        self.st().non_pawn_material[c as usize]
    }

    #[inline(always)]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline(always)]
    pub fn nodes_searched(&self) -> u64 {
        self.nodes
    }

    #[inline(always)]
    pub fn moved_piece(&self, m: Move) -> Piece {
        self.board[m.from() as usize]
    }

    #[inline(always)]
    pub fn captured_piece(&self) -> Piece {
        self.st().captured_piece
    }

    #[inline(always)]
    pub fn is_capture(&self, m: Move) -> bool {
        !self.is_empty(m.to())
    }

    pub fn advanced_soldier_push(&self, m: Move) -> bool {
        type_of(self.moved_piece(m)) == PieceType::Soldier
            && relative_rank_of(self.side_to_move as u8, m.from()) > 3
    }

    pub fn soldier_passed(&self, c: Color, s: Square) -> bool {
        self.pieces_colored(PieceType::Soldier, c.opposite())
            & passed_soldier_mask(c as u8, s)
            == EMPTY
    }

    /// Non-soldier, non-general material interpolated between the endgame and
    /// midgame limits, scaled to 0..128.
    pub fn game_phase(&self) -> i32 {
        let npm = self.st().non_pawn_material[0] + self.st().non_pawn_material[1];
        let npm = npm.clamp(ENDGAME_LIMIT, MIDGAME_LIMIT);
        ((npm - ENDGAME_LIMIT) * PHASE_MIDGAME) / (MIDGAME_LIMIT - ENDGAME_LIMIT)
    }

    #[inline(always)]
    pub fn attacks_from(&self, pc: Piece, s: Square) -> Bitboard {
        attacks_bb(pc, s, self.all_pieces())
    }

    #[inline(always)]
    pub fn attackers_to(&self, s: Square) -> Bitboard {
        self.attackers_to_occ(s, self.all_pieces())
    }

    /// All pieces of either color attacking `s` under the given occupancy.
    /// Soldier attackers come from reversed step tables: the forward attacker
    /// sits on the file, the sideways attackers share the rank and therefore
    /// the river-crossing status of `s`.
    pub fn attackers_to_occ(&self, s: Square, occupied: Bitboard) -> Bitboard {
        let file = file_bb(file_of(s));
        let rank = rank_bb(rank_of(s));

        (step_attacks(B_SOLDIER, s) & self.pieces_colored(PieceType::Soldier, Color::White) & file)
            | (step_attacks(W_SOLDIER, s)
                & self.pieces_colored(PieceType::Soldier, Color::White)
                & rank)
            | (step_attacks(W_SOLDIER, s)
                & self.pieces_colored(PieceType::Soldier, Color::Black)
                & file)
            | (step_attacks(B_SOLDIER, s)
                & self.pieces_colored(PieceType::Soldier, Color::Black)
                & rank)
            | (self.horses_to(s, occupied) & self.pieces_of_type(PieceType::Horse))
            | (chariot_attacks(s, occupied) & self.pieces_of_type(PieceType::Chariot))
            | (cannon_attacks(s, occupied) & self.pieces_of_type(PieceType::Cannon))
            | (elephant_attacks(s, occupied) & self.pieces_of_type(PieceType::Elephant))
            | (step_attacks(W_ADVISOR, s) & self.pieces_colored(PieceType::Advisor, Color::White))
            | (step_attacks(B_ADVISOR, s) & self.pieces_colored(PieceType::Advisor, Color::Black))
            | (step_attacks(W_GENERAL, s) & self.pieces_colored(PieceType::General, Color::White))
            | (step_attacks(B_GENERAL, s) & self.pieces_colored(PieceType::General, Color::Black))
    }

    /// Horses attacking `s`: the leg sits next to the horse, on the far side
    /// from the destination, so the reverse relation cannot reuse the horse
    /// attack table directly.
    pub fn horses_to(&self, s: Square, occupied: Bitboard) -> Bitboard {
        let mut result = EMPTY;
        let mut horses = pseudo_attacks(PieceType::Horse, s) & self.pieces_of_type(PieceType::Horse);
        while horses != 0 {
            let h = pop_lsb(&mut horses);
            let leg = horse_leg(h, s);
            if leg != SQ_NONE && !has_bit(occupied, leg) {
                set_bit(&mut result, h);
            }
        }
        result
    }

    /// Squares from which a horse would attack `s` under current occupancy.
    pub fn horse_squares_to(&self, s: Square) -> Bitboard {
        let mut result = EMPTY;
        let mut squares = pseudo_attacks(PieceType::Horse, s);
        while squares != 0 {
            let sq = pop_lsb(&mut squares);
            let leg = horse_leg(sq, s);
            if leg != SQ_NONE && !has_bit(self.all_pieces(), leg) {
                set_bit(&mut result, sq);
            }
        }
        result
    }

    /// Squares from which a `c` soldier would attack `s`.
    pub fn soldier_squares_to(&self, s: Square, c: Color) -> Bitboard {
        let mut squares = EMPTY;
        let behind = if c == Color::White { -1 } else { 1 };
        let fr = rank_of(s) as i32 + behind;
        if (0..10).contains(&fr) {
            set_bit(&mut squares, make_square(file_of(s), fr as u8));
        }
        if relative_rank_of(c as u8, s) > 4 {
            if file_of(s) > 0 {
                set_bit(&mut squares, s - 1);
            }
            if file_of(s) < 8 {
                set_bit(&mut squares, s + 1);
            }
        }
        squares & !self.pieces(c)
    }

    /// Pieces shielding `s` from enemy chariots: a single piece on the ray.
    /// Returns (blockers, sniper squares).
    pub fn slider_blockers(&self, sliders: Bitboard, s: Square) -> (Bitboard, Bitboard) {
        let mut blockers = EMPTY;
        let mut pinners = EMPTY;
        let mut snipers = pseudo_attacks(PieceType::Chariot, s) & sliders;
        while snipers != 0 {
            let sniper = pop_lsb(&mut snipers);
            let b = between_bb(s, sniper) & self.all_pieces();
            if b != 0 && !more_than_one(b) {
                blockers |= b;
                if b & self.pieces(color_of(self.piece_at(s))) != 0 {
                    set_bit(&mut pinners, sniper);
                }
            }
        }
        (blockers, pinners)
    }

    /// Cannon shields: exactly two pieces on the ray, one screen plus one
    /// blocker; removing either re-opens the jump.
    pub fn cannon_blockers(&self, cannons: Bitboard, s: Square) -> (Bitboard, Bitboard) {
        let mut blockers = EMPTY;
        let mut pinners = EMPTY;
        let mut snipers = pseudo_attacks(PieceType::Chariot, s) & cannons;
        while snipers != 0 {
            let sniper = pop_lsb(&mut snipers);
            let b = between_bb(s, sniper) & self.all_pieces();
            if popcount(b) == 2 {
                blockers |= b;
                if b & self.pieces(color_of(self.piece_at(s))) != 0 {
                    set_bit(&mut pinners, sniper);
                }
            }
        }
        (blockers, pinners)
    }

    /// Horse-leg shields: the piece on the leg of a horse that would attack
    /// `s` once the leg clears.
    pub fn horse_blockers(&self, horses: Bitboard, s: Square) -> (Bitboard, Bitboard) {
        let mut blockers = EMPTY;
        let mut pinners = EMPTY;
        let mut snipers = pseudo_attacks(PieceType::Horse, s) & horses;
        while snipers != 0 {
            let sniper = pop_lsb(&mut snipers);
            let leg = horse_leg(sniper, s);
            if leg == SQ_NONE {
                continue;
            }
            let b = square_bb(leg) & self.all_pieces();
            if b != 0 {
                blockers |= b;
                if b & self.pieces(color_of(self.piece_at(s))) != 0 {
                    set_bit(&mut pinners, sniper);
                }
            }
        }
        (blockers, pinners)
    }

    fn set_check_info(&mut self) {
        let mut blockers = [EMPTY; 2];
        let mut pinners = [EMPTY; 2];
        let mut fixed = [EMPTY; 2];

        for c in [Color::White, Color::Black] {
            let ksq = self.general_square(c);
            let them = c.opposite();

            let (sb, sp) =
                self.slider_blockers(self.pieces_colored(PieceType::Chariot, them), ksq);
            let (cb, cp) = self.cannon_blockers(self.pieces_colored(PieceType::Cannon, them), ksq);
            let (hb, hp) = self.horse_blockers(self.pieces_colored(PieceType::Horse, them), ksq);

            blockers[c as usize] = sb | cb | hb;
            pinners[c as usize] = sp | cp | hp;
            fixed[c as usize] = hb & self.pieces(c);
        }

        let us = self.side_to_move;
        let their_ksq = self.general_square(us.opposite());
        let mut check_squares = [EMPTY; 8];
        check_squares[PieceType::Soldier as usize] = self.soldier_squares_to(their_ksq, us);
        check_squares[PieceType::Horse as usize] = self.horse_squares_to(their_ksq);
        check_squares[PieceType::Cannon as usize] =
            cannon_attacks(their_ksq, self.all_pieces());
        check_squares[PieceType::Chariot as usize] =
            chariot_attacks(their_ksq, self.all_pieces());

        let st = self.st_mut();
        st.blockers_for_king = blockers;
        st.pinners_for_king = pinners;
        st.fixed_pinned = fixed;
        st.check_squares = check_squares;
    }

    /// Rebuilds every hash key and derived bitboard from scratch. Used when a
    /// position is set up; afterwards everything updates incrementally.
    fn set_state(&mut self) {
        let mut key = 0u64;
        let mut pawn_key = 0u64;
        let mut material_key = 0u64;
        let mut npm = [0i32; 2];
        let mut psq = Score::zero();

        for s in iter_bits(self.all_pieces()) {
            let pc = self.piece_at(s);
            key ^= piece_square_key(pc, s);
            psq = psq.add(psqt::psq(pc, s));
        }
        if self.side_to_move == Color::Black {
            key ^= side_key();
        }

        for s in iter_bits(self.pieces_of_type(PieceType::Soldier)) {
            pawn_key ^= piece_square_key(self.piece_at(s), s);
        }

        for pc in PIECES {
            let pt = type_of(pc);
            if pt != PieceType::Soldier && pt != PieceType::General {
                npm[color_of(pc) as usize] += self.piece_count[pc as usize] * piece_value_mg(pc);
            }
            for cnt in 0..self.piece_count[pc as usize] {
                material_key ^= material_count_key(pc, cnt);
            }
        }

        let checkers = self.attackers_to(self.general_square(self.side_to_move))
            & self.pieces(self.side_to_move.opposite());

        let st = self.st_mut();
        st.key = key;
        st.pawn_key = pawn_key;
        st.material_key = material_key;
        st.non_pawn_material = npm;
        st.psq = psq;
        st.checkers_bb = checkers;

        self.set_check_info();
    }

    #[inline(always)]
    fn put_piece(&mut self, pc: Piece, s: Square) {
        self.board[s as usize] = pc;
        set_bit(&mut self.by_type_bb[0], s);
        set_bit(&mut self.by_type_bb[(pc & 7) as usize], s);
        set_bit(&mut self.by_color_bb[(pc >> 3) as usize], s);
        self.index[s as usize] = self.piece_count[pc as usize] as u8;
        self.piece_list[pc as usize][self.index[s as usize] as usize] = s;
        self.piece_count[pc as usize] += 1;
        self.piece_count[(pc & 8) as usize] += 1;
    }

    #[inline(always)]
    fn remove_piece(&mut self, pc: Piece, s: Square) {
        // board[s] is left for the capturing piece to overwrite.
        clear_bit(&mut self.by_type_bb[0], s);
        clear_bit(&mut self.by_type_bb[(pc & 7) as usize], s);
        clear_bit(&mut self.by_color_bb[(pc >> 3) as usize], s);
        self.piece_count[pc as usize] -= 1;
        let last = self.piece_list[pc as usize][self.piece_count[pc as usize] as usize];
        self.index[last as usize] = self.index[s as usize];
        self.piece_list[pc as usize][self.index[last as usize] as usize] = last;
        self.piece_list[pc as usize][self.piece_count[pc as usize] as usize] = SQ_NONE;
        self.piece_count[(pc & 8) as usize] -= 1;
    }

    /// Reinstates a captured piece at its recorded piece-list slot so that a
    /// do/undo pair leaves the list and index array bit-for-bit unchanged.
    #[inline(always)]
    fn put_piece_at(&mut self, pc: Piece, s: Square, slot: u8) {
        self.board[s as usize] = pc;
        set_bit(&mut self.by_type_bb[0], s);
        set_bit(&mut self.by_type_bb[(pc & 7) as usize], s);
        set_bit(&mut self.by_color_bb[(pc >> 3) as usize], s);
        let count = self.piece_count[pc as usize] as usize;
        if (slot as usize) < count {
            let displaced = self.piece_list[pc as usize][slot as usize];
            self.piece_list[pc as usize][count] = displaced;
            self.index[displaced as usize] = count as u8;
        }
        self.piece_list[pc as usize][slot as usize] = s;
        self.index[s as usize] = slot;
        self.piece_count[pc as usize] += 1;
        self.piece_count[(pc & 8) as usize] += 1;
    }

    #[inline(always)]
    fn move_piece(&mut self, pc: Piece, from: Square, to: Square) {
        // index[from] goes stale; it is only ever read for occupied squares.
        let from_to = square_bb(from) ^ square_bb(to);
        self.by_type_bb[0] ^= from_to;
        self.by_type_bb[(pc & 7) as usize] ^= from_to;
        self.by_color_bb[(pc >> 3) as usize] ^= from_to;
        self.board[from as usize] = NO_PIECE;
        self.board[to as usize] = pc;
        self.index[to as usize] = self.index[from as usize];
        self.piece_list[pc as usize][self.index[to as usize] as usize] = to;
    }

    /// Tests whether a pseudo-legal move is fully legal. Covers the xiangqi
    /// specifics: the flying-general rule, cannon screens, and horse pins.
    pub fn legal(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = us.opposite();
        let from = m.from();
        let to = m.to();
        let ksq = self.general_square(us);
        let their_ksq = self.general_square(them);
        let occupied_after = (self.all_pieces() ^ square_bb(from)) | square_bb(to);

        if type_of(self.piece_at(from)) == PieceType::General {
            if self.attackers_to_occ(to, occupied_after) & self.pieces(them) != 0 {
                return false;
            }
            // The generals may not face each other across an open file.
            return file_of(to) != file_of(their_ksq)
                || between_bb(to, their_ksq) & occupied_after != 0;
        }

        // A move may not leave the generals newly facing each other. When a
        // set-up position already has them facing, only king moves are held
        // to the rule.
        if file_of(ksq) == file_of(their_ksq)
            && between_bb(ksq, their_ksq) & occupied_after == 0
            && between_bb(ksq, their_ksq) & self.all_pieces() != 0
        {
            return false;
        }

        // Stepping between an unscreened enemy cannon and our general would
        // hand it a screen.
        let mut facing_cannons =
            chariot_attacks(ksq, self.all_pieces()) & self.pieces_colored(PieceType::Cannon, them);
        while facing_cannons != 0 {
            let csq = pop_lsb(&mut facing_cannons);
            if between_bb(csq, ksq) & square_bb(to) != 0 {
                return false;
            }
        }

        // An active cannon check must be resolved outright: capture the
        // cannon, change the screen count, or walk the screen off the line.
        let ch = self.checkers();
        if ch != 0 {
            let checksq = lsb(ch);
            if type_of(self.piece_at(checksq)) == PieceType::Cannon {
                let touches = (between_bb(checksq, ksq) | square_bb(checksq)) & square_bb(to) != 0
                    || between_bb(checksq, ksq) & square_bb(from) != 0;
                if !touches
                    || (aligned(checksq, from, ksq) && aligned(checksq, to, ksq))
                {
                    return false;
                }
            }
        }

        if self.fixed_pinned(us) & square_bb(from) != 0 {
            return false;
        }

        if self.pinned_pieces(us) & square_bb(from) != 0 && !aligned(from, to, ksq) {
            return false;
        }

        !self.receives_cannon_check(m)
    }

    /// Checker used for blocking targets; under a collinear double check the
    /// one nearer the general resolves both.
    pub(crate) fn closest_checker(&self, ksq: Square) -> Square {
        let mut ch = self.checkers();
        let first = pop_lsb(&mut ch);
        if ch == 0 {
            return first;
        }
        let second = lsb(ch);
        if square_distance(first, ksq) <= square_distance(second, ksq) {
            first
        } else {
            second
        }
    }

    /// Squares that block or capture the checker, including a checking
    /// horse's leg.
    pub(crate) fn evasion_block_targets(&self, ksq: Square, checksq: Square) -> Bitboard {
        let mut target = between_bb(checksq, ksq) | square_bb(checksq);
        if type_of(self.piece_at(checksq)) == PieceType::Horse {
            let leg = horse_leg(checksq, ksq);
            if leg != SQ_NONE {
                target |= square_bb(leg);
            }
        }
        target
    }

    /// Validates a move from the transposition table that may be stale or
    /// aliased. Mirrors the filtering the evasion generator performs so that
    /// `legal()` sees the same move population either way.
    pub fn pseudo_legal(&self, m: Move) -> bool {
        if !m.is_ok() || !is_ok(m.from()) || !is_ok(m.to()) {
            return false;
        }

        let us = self.side_to_move;
        let from = m.from();
        let to = m.to();
        let pc = self.piece_at(from);

        if pc == NO_PIECE || color_of(pc) != us {
            return false;
        }
        if self.pieces(us) & square_bb(to) != 0 {
            return false;
        }

        if type_of(pc) == PieceType::Cannon && self.is_empty(to) {
            // Quiet cannon moves slide on chariot rays.
            if chariot_attacks(from, self.all_pieces()) & square_bb(to) == 0 {
                return false;
            }
        } else if self.attacks_from(pc, from) & square_bb(to) == 0 {
            return false;
        }

        if self.checkers() != 0 {
            let ksq = self.general_square(us);
            if type_of(pc) != PieceType::General {
                if more_than_one(self.checkers()) {
                    let mut ch = self.checkers();
                    let first = pop_lsb(&mut ch);
                    let second = lsb(ch);
                    if !aligned(first, second, ksq) {
                        return false;
                    }
                }
                let checksq = self.closest_checker(ksq);
                let target = self.evasion_block_targets(ksq, checksq);
                if target & square_bb(to) == 0 {
                    // The screen of a checking cannon may flee the line.
                    let screen_flees = type_of(self.piece_at(checksq)) == PieceType::Cannon
                        && between_bb(checksq, ksq) & square_bb(from) != 0;
                    if !screen_flees {
                        return false;
                    }
                }
            } else if self.attackers_to_occ(to, self.all_pieces() ^ square_bb(from))
                & self.pieces(us.opposite())
                != 0
            {
                return false;
            }
        }

        true
    }

    /// Tests whether a pseudo-legal move checks the enemy general. Three
    /// independent conditions: a cannon line opening up, a discovered check,
    /// and a direct check from the destination square.
    pub fn gives_check(&self, m: Move) -> bool {
        let from = m.from();
        let to = m.to();

        if self.gives_cannon_check(m) {
            return true;
        }

        if self.discovered_check_candidates() & square_bb(from) != 0
            && !aligned(from, to, self.general_square(self.side_to_move.opposite()))
        {
            return true;
        }

        self.check_squares(type_of(self.piece_at(from))) & square_bb(to) != 0
    }

    /// Does the move leave one of our cannons bearing on the enemy general
    /// behind exactly one screen?
    pub fn gives_cannon_check(&self, m: Move) -> bool {
        let from = m.from();
        let to = m.to();
        let ksq = self.general_square(self.side_to_move.opposite());

        if aligned(from, to, ksq) {
            return false;
        }

        let occupied = (self.all_pieces() ^ square_bb(from)) | square_bb(to);
        let mut cannons = self.pieces_colored(PieceType::Cannon, self.side_to_move);
        if type_of(self.piece_at(from)) == PieceType::Cannon {
            cannons = (cannons ^ square_bb(from)) | square_bb(to);
        }

        cannon_attacks(ksq, occupied) & cannons != 0
    }

    /// Does the move expose our own general to a cannon?
    pub fn receives_cannon_check(&self, m: Move) -> bool {
        let from = m.from();
        let to = m.to();
        let ksq = self.general_square(self.side_to_move);

        let occupied = (self.all_pieces() ^ square_bb(from)) | square_bb(to);
        let mut cannons = self.pieces_colored(PieceType::Cannon, self.side_to_move.opposite());
        if type_of(self.piece_at(to)) == PieceType::Cannon {
            cannons &= !square_bb(to);
        }

        cannon_attacks(ksq, occupied) & cannons != 0
    }

    /// Makes a move. The move must be legal; gives_check carries the result
    /// of `gives_check(m)` so checkers can be set without a full scan.
    pub fn do_move(&mut self, m: Move, gives_check: bool) {
        self.nodes += 1;

        let us = self.side_to_move;
        let them = us.opposite();
        let from = m.from();
        let to = m.to();
        let pc = self.piece_at(from);
        let captured = self.piece_at(to);

        let mut k = self.st().key ^ side_key();
        let mut new_st = StateInfo {
            pawn_key: self.st().pawn_key,
            material_key: self.st().material_key,
            non_pawn_material: self.st().non_pawn_material,
            plies_from_null: self.st().plies_from_null + 1,
            psq: self.st().psq,
            ..StateInfo::new()
        };
        self.game_ply += 1;

        if captured != NO_PIECE {
            new_st.captured_index = self.index[to as usize];

            if type_of(captured) == PieceType::Soldier {
                new_st.pawn_key ^= piece_square_key(captured, to);
            } else {
                new_st.non_pawn_material[them as usize] -= piece_value_mg(captured);
            }

            self.remove_piece(captured, to);
            k ^= piece_square_key(captured, to);
            new_st.material_key ^= material_count_key(captured, self.piece_count[captured as usize]);
            new_st.psq = new_st.psq.sub(psqt::psq(captured, to));
        }

        k ^= piece_square_key(pc, from) ^ piece_square_key(pc, to);
        self.move_piece(pc, from, to);

        if type_of(pc) == PieceType::Soldier {
            new_st.pawn_key ^= piece_square_key(pc, from) ^ piece_square_key(pc, to);
        }

        new_st.psq = new_st.psq.add(psqt::psq(pc, to).sub(psqt::psq(pc, from)));
        new_st.captured_piece = captured;
        new_st.key = k;
        new_st.checkers_bb = if gives_check {
            self.attackers_to(self.general_square(them)) & self.pieces(us)
        } else {
            EMPTY
        };

        self.states.push(new_st);
        self.side_to_move = them;
        self.set_check_info();
    }

    /// Unmakes a move; every field returns to its exact pre-move value.
    pub fn undo_move(&mut self, m: Move) {
        self.side_to_move = self.side_to_move.opposite();

        let from = m.from();
        let to = m.to();
        let pc = self.piece_at(to);
        let captured = self.st().captured_piece;
        let captured_index = self.st().captured_index;

        self.move_piece(pc, to, from);
        if captured != NO_PIECE {
            self.put_piece_at(captured, to, captured_index);
        }

        self.states.pop();
        self.game_ply -= 1;
    }

    pub fn do_null_move(&mut self) {
        let mut st = self.st().clone();
        st.key ^= side_key();
        st.plies_from_null = 0;
        st.captured_piece = NO_PIECE;
        self.states.push(st);
        self.side_to_move = self.side_to_move.opposite();
        self.set_check_info();
    }

    pub fn undo_null_move(&mut self) {
        self.states.pop();
        self.side_to_move = self.side_to_move.opposite();
    }

    /// Hash of the position after `m`, without making the move.
    pub fn key_after(&self, m: Move) -> u64 {
        let from = m.from();
        let to = m.to();
        let pc = self.piece_at(from);
        let captured = self.piece_at(to);
        let mut k = self.st().key ^ side_key();

        if captured != NO_PIECE {
            k ^= piece_square_key(captured, to);
        }
        k ^ piece_square_key(pc, to) ^ piece_square_key(pc, from)
    }

    /// Draw by repetition, walking the state stack two plies at a time.
    pub fn is_draw(&self) -> bool {
        let here = self.states.len() - 1;
        let key = self.st().key;
        let mut i = 2;
        while i <= self.st().plies_from_null as usize && i <= here {
            if self.states[here - i].key == key {
                return true;
            }
            i += 2;
        }
        false
    }

    pub fn see_ge(&self, m: Move, threshold: i32) -> bool {
        crate::search::see::see_ge(self, m, threshold)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in (0..10u8).rev() {
            for file in 0..9u8 {
                let pc = self.piece_at(make_square(file, r));
                let c = PIECE_TO_CHAR.as_bytes()[pc as usize] as char;
                let cell = match (pc != NO_PIECE, file != 8) {
                    (true, true) => format!("{}---", c),
                    (true, false) => format!("{}", c),
                    (false, true) => "----".to_string(),
                    (false, false) => "-".to_string(),
                };
                f.write_str(&cell)?;
            }
            match r {
                5 => f.write_str("\n|||||||||||||||||||||||||||||||||\n")?,
                9 | 2 => f.write_str("\n|   |   |   | \\ | / |   |   |   |\n")?,
                8 | 1 => f.write_str("\n|   |   |   | / | \\ |   |   |   |\n")?,
                0 => (),
                _ => f.write_str("\n|   |   |   |   |   |   |   |   |\n")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::moves::{GenType, MoveList};

    fn setup() {
        crate::init();
    }

    fn assert_positions_equal(a: &Position, b: &Position) {
        assert_eq!(a.board, b.board, "board");
        assert_eq!(a.by_type_bb, b.by_type_bb, "type bitboards");
        assert_eq!(a.by_color_bb, b.by_color_bb, "color bitboards");
        assert_eq!(a.piece_count, b.piece_count, "piece counts");
        assert_eq!(a.piece_list, b.piece_list, "piece lists");
        for s in iter_bits(a.all_pieces()) {
            assert_eq!(a.index[s as usize], b.index[s as usize], "index[{}]", s);
        }
        assert_eq!(a.side_to_move, b.side_to_move, "side");
        assert_eq!(a.game_ply, b.game_ply, "ply");
        assert_eq!(a.key(), b.key(), "key");
        assert_eq!(a.pawn_key(), b.pawn_key(), "pawn key");
        assert_eq!(a.material_key(), b.material_key(), "material key");
        assert_eq!(a.psq_score(), b.psq_score(), "psq");
        assert_eq!(
            a.st().non_pawn_material,
            b.st().non_pawn_material,
            "non-pawn material"
        );
        assert_eq!(a.checkers(), b.checkers(), "checkers");
        assert_eq!(
            a.st().blockers_for_king,
            b.st().blockers_for_king,
            "blockers"
        );
        assert_eq!(a.st().pinners_for_king, b.st().pinners_for_king, "pinners");
        assert_eq!(a.st().fixed_pinned, b.st().fixed_pinned, "fixed pins");
        assert_eq!(a.st().check_squares, b.st().check_squares, "check squares");
    }

    fn clone_position(pos: &Position) -> Position {
        Position {
            board: pos.board,
            by_type_bb: pos.by_type_bb,
            by_color_bb: pos.by_color_bb,
            piece_count: pos.piece_count,
            piece_list: pos.piece_list,
            index: pos.index,
            side_to_move: pos.side_to_move,
            game_ply: pos.game_ply,
            nodes: pos.nodes,
            states: pos.states.clone(),
        }
    }

    #[test]
    fn test_fen_round_trip() {
        setup();
        let pos = Position::startpos();
        assert_eq!(pos.fen(), START_FEN);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.count(W_SOLDIER), 5);
        assert_eq!(pos.count(B_CHARIOT), 2);
        assert_eq!(pos.general_square(Color::White), make_square(4, 0));
        assert_eq!(pos.general_square(Color::Black), make_square(4, 9));
        assert_eq!(pos.checkers(), EMPTY);
        assert_ne!(pos.key(), 0);
    }

    #[test]
    fn test_fen_rejects_bad_input() {
        setup();
        assert!(matches!(Position::from_fen(""), Err(FenError::Malformed)));
        assert!(matches!(
            Position::from_fen("rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR"),
            Err(FenError::InvalidSideToMove)
        ));
        assert!(matches!(
            Position::from_fen("4k4/9/9/9/9/9/9/9/9/9 w - - 0 1"),
            Err(FenError::InvalidPieceCount(_))
        ));
        assert!(matches!(
            Position::from_fen("4k4/9/9/9/9/9/9/9/9/3KK4 w - - 0 1"),
            Err(FenError::InvalidPieceCount(_))
        ));
        assert!(matches!(
            Position::from_fen("4k4/9/9/9/9/9/9/9/9/P3K4 w - - 0 1"),
            Err(FenError::SoldierOnBackRank)
        ));
        assert!(matches!(
            Position::from_fen("4x4/9/9/9/9/9/9/9/9/4K4 w - - 0 1"),
            Err(FenError::InvalidPiece('x'))
        ));
        assert!(matches!(
            Position::from_fen("ppppppppp/pp7/9/9/9/9/9/9/9/4K4 w - - 0 1"),
            Err(_)
        ));
    }

    #[test]
    fn test_zobrist_distinguishes_positions() {
        setup();
        let a = Position::from_fen("4k4/9/9/9/9/9/9/9/9/R3K4 w - - 0 1").unwrap();
        let b = Position::from_fen("4k4/9/9/9/9/9/9/9/9/1R2K4 w - - 0 1").unwrap();
        let c = Position::from_fen("4k4/9/9/9/9/9/9/9/9/R3K4 b - - 0 1").unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        // Placement on the top ranks must influence the key too.
        let d = Position::from_fen("4k3R/9/9/9/9/9/9/9/9/4K4 w - - 0 1").unwrap();
        let e = Position::from_fen("4k2R1/9/9/9/9/9/9/9/9/4K4 w - - 0 1").unwrap();
        assert_ne!(d.key(), e.key());
    }

    #[test]
    fn test_attackers_symmetry() {
        setup();
        // Property: attackers_to(s) restricted to c equals the set of c's
        // pieces whose attack set contains s.
        let fens = [
            START_FEN,
            "rnbakabnr/9/1c5c1/p1p1p1p1p/9/4P4/P1P3P1P/1C5C1/9/RNBAKABNR b - - 0 1",
            "2bak4/4a4/4b4/p3p3p/4c4/2n3n2/P3P3P/4C4/2R1A4/2BAK2r1 w - - 0 1",
        ];
        for fen in fens {
            let pos = Position::from_fen(fen).unwrap();
            for s in 0..SQUARE_NB {
                let attackers = pos.attackers_to(s);
                for c in [Color::White, Color::Black] {
                    let mut expected = EMPTY;
                    for pc in PIECES.iter().filter(|&&pc| color_of(pc) == c) {
                        for &from in pos.piece_squares(*pc) {
                            if pos.attacks_from(*pc, from) & square_bb(s) != 0 {
                                set_bit(&mut expected, from);
                            }
                        }
                    }
                    assert_eq!(
                        attackers & pos.pieces(c),
                        expected,
                        "attackers of {} for {:?} in {}",
                        square_to_string(s),
                        c,
                        fen
                    );
                }
            }
        }
    }

    #[test]
    fn test_make_unmake_invariance() {
        setup();
        let fens = [
            START_FEN,
            "4k4/9/9/9/9/9/9/9/9/R3K4 w - - 0 1",
            "2bak4/4a4/4b4/p3p3p/4c4/2n3n2/P3P3P/4C4/2R1A4/2BAK2r1 w - - 0 1",
            "3ak4/4a4/4b4/9/9/9/4p4/4C4/9/4K4 b - - 0 1",
        ];
        for fen in fens {
            let mut pos = Position::from_fen(fen).unwrap();
            let snapshot = clone_position(&pos);
            let moves = MoveList::new(&pos, GenType::Legal);
            assert!(moves.len() > 0, "no legal moves in {}", fen);
            for m in moves.iter() {
                let gives_check = pos.gives_check(m.mv);
                pos.do_move(m.mv, gives_check);
                pos.undo_move(m.mv);
                assert_positions_equal(&pos, &snapshot);
            }
        }
    }

    #[test]
    fn test_incremental_state_matches_rebuild() {
        setup();
        // After any move the incrementally maintained keys must equal a
        // from-scratch rebuild via FEN.
        let mut pos = Position::startpos();
        let moves = MoveList::new(&pos, GenType::Legal);
        for m in moves.iter().take(12) {
            let gives_check = pos.gives_check(m.mv);
            pos.do_move(m.mv, gives_check);
            let rebuilt = Position::from_fen(&pos.fen()).unwrap();
            assert_eq!(pos.key(), rebuilt.key());
            assert_eq!(pos.pawn_key(), rebuilt.pawn_key());
            assert_eq!(pos.material_key(), rebuilt.material_key());
            assert_eq!(pos.psq_score(), rebuilt.psq_score());
            pos.undo_move(m.mv);
        }
    }

    #[test]
    fn test_chariot_gives_check_down_the_file() {
        setup();
        let mut pos = Position::from_fen("4k4/9/9/9/9/9/9/9/9/R3K4 w - - 0 1").unwrap();
        let m = Move::new(make_square(0, 0), make_square(0, 9));
        assert!(pos.pseudo_legal(m));
        assert!(pos.legal(m));
        assert!(pos.gives_check(m));
        pos.do_move(m, true);
        assert_ne!(pos.checkers(), EMPTY);
        let evasions = MoveList::new(&pos, GenType::Legal);
        for em in evasions.iter() {
            let gc = pos.gives_check(em.mv);
            pos.do_move(em.mv, gc);
            assert_eq!(
                pos.st().checkers_bb,
                pos.attackers_to(pos.general_square(pos.side_to_move()))
                    & pos.pieces(pos.side_to_move().opposite())
            );
            pos.undo_move(em.mv);
        }
    }

    #[test]
    fn test_advisors_move_only_diagonally() {
        setup();
        let pos = Position::from_fen("4k4/9/9/9/9/9/9/9/9/3AKA3 w - - 0 1").unwrap();
        // Stepping to e2 would expose the general to the flying rule.
        assert!(!pos.legal(Move::new(make_square(4, 0), make_square(4, 1))));
        // The advisors reach e2 diagonally.
        assert!(pos.legal(Move::new(make_square(3, 0), make_square(4, 1))));
        assert!(pos.legal(Move::new(make_square(5, 0), make_square(4, 1))));
        let moves = MoveList::new(&pos, GenType::Legal);
        for m in moves.iter() {
            let pc = pos.moved_piece(m.mv);
            if type_of(pc) == PieceType::Advisor {
                assert_eq!(file_distance(m.mv.from(), m.mv.to()), 1);
                assert_eq!(rank_distance(m.mv.from(), m.mv.to()), 1);
            }
        }
    }

    #[test]
    fn test_cannon_between_generals_is_screen() {
        setup();
        // A lone black cannon on the shared file is a screen for the facing
        // rule and no check: it has nothing to jump over.
        let pos = Position::from_fen("4k4/9/9/9/9/9/4c4/9/9/4K4 w - - 0 1").unwrap();
        assert_eq!(pos.checkers(), EMPTY);
        let moves = MoveList::new(&pos, GenType::Legal);
        let mut targets: Vec<String> = moves
            .iter()
            .map(|m| square_to_string(m.mv.to()))
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["d1", "e2", "f1"]);
    }

    #[test]
    fn test_flying_general_blocked_by_screens() {
        setup();
        let pos = Position::from_fen("3ak4/4a4/4b4/9/9/9/9/9/9/4K4 w - - 0 1").unwrap();
        assert_eq!(pos.checkers(), EMPTY);
        // Stepping up the shared file is fine: two screens remain.
        assert!(pos.legal(Move::new(make_square(4, 0), make_square(4, 1))));
        // Property: no legal move may leave the generals facing.
        let mut pos = pos;
        let moves = MoveList::new(&pos, GenType::Legal);
        for m in moves.iter() {
            let gc = pos.gives_check(m.mv);
            pos.do_move(m.mv, gc);
            let w = pos.general_square(Color::White);
            let b = pos.general_square(Color::Black);
            assert!(
                file_of(w) != file_of(b) || between_bb(w, b) & pos.all_pieces() != 0,
                "flying generals after {}",
                square_to_string(m.mv.to())
            );
            pos.undo_move(m.mv);
        }
    }

    #[test]
    fn test_flying_general_forbids_unscreening() {
        setup();
        // A single white chariot screens the generals; it is confined to the
        // shared file.
        let pos = Position::from_fen("4k4/9/9/9/9/9/9/4R4/9/4K4 w - - 0 1").unwrap();
        let from = make_square(4, 2);
        assert!(pos.legal(Move::new(from, make_square(4, 6))));
        assert!(!pos.legal(Move::new(from, make_square(3, 2))));
        assert!(!pos.legal(Move::new(from, make_square(8, 2))));
    }

    #[test]
    fn test_moving_into_cannon_line_is_illegal() {
        setup();
        // Black cannon faces the white general with nothing between; putting
        // a piece on the file would create the screen that checks.
        let pos = Position::from_fen("3ak4/9/9/9/4c4/9/9/4R4/9/3K5 w - - 0 1").unwrap();
        // Chariot e3 leaving the e-file is fine: the generals do not share a
        // file here and the cannon bears on e1, not d1.
        assert!(pos.legal(Move::new(make_square(4, 2), make_square(3, 2))));
        let pos2 = Position::from_fen("3ak4/9/9/9/4c4/9/9/3R5/9/4K4 w - - 0 1").unwrap();
        // Stepping onto the e-file between cannon and general gives check.
        assert!(!pos2.legal(Move::new(make_square(3, 2), make_square(4, 2))));
    }

    #[test]
    fn test_horse_fixed_pin() {
        setup();
        // Black horse g2 would attack the white general e1 through its leg
        // f2; the white chariot standing there may not move at all.
        let pos = Position::from_fen("4k4/9/9/9/4p4/9/9/9/5Rn2/4K4 w - - 0 1").unwrap();
        let horse = make_square(6, 1);
        let leg = make_square(5, 1);
        assert_eq!(horse_leg(horse, make_square(4, 0)), leg);
        assert_eq!(pos.fixed_pinned(Color::White), square_bb(leg));
        assert!(!pos.legal(Move::new(leg, make_square(5, 8))));
        assert!(!pos.legal(Move::new(leg, make_square(0, 1))));
        assert!(!pos.legal(Move::new(leg, make_square(6, 1))));
        // The general itself is free to step aside.
        assert!(pos.legal(Move::new(make_square(4, 0), make_square(3, 0))));
    }

    #[test]
    fn test_pinned_chariot_stays_on_line() {
        setup();
        // White chariot e5 shields the general from the black chariot e9.
        let pos = Position::from_fen("3ak4/4r4/9/9/9/4R4/9/9/9/4K4 w - - 0 1").unwrap();
        let from = make_square(4, 4);
        assert_ne!(pos.pinned_pieces(Color::White) & square_bb(from), EMPTY);
        assert!(pos.legal(Move::new(from, make_square(4, 7))));
        assert!(pos.legal(Move::new(from, make_square(4, 8))));
        assert!(!pos.legal(Move::new(from, make_square(0, 4))));
    }

    #[test]
    fn test_gives_check_all_three_conditions() {
        setup();
        // (a) discovered cannon check: the white horse screens its own
        // cannon; once it jumps away exactly one screen (black's soldier)
        // remains.
        let pos =
            Position::from_fen("4k4/9/4p4/9/9/4N4/9/4C4/9/3K5 w - - 0 1").unwrap();
        let m = Move::new(make_square(4, 4), make_square(2, 5));
        assert!(pos.gives_cannon_check(m));
        assert!(pos.gives_check(m));

        // (b) a cannon move that lines up behind one screen.
        let pos = Position::from_fen("4k4/9/4p4/9/9/9/9/C8/9/3K5 w - - 0 1").unwrap();
        let m = Move::new(make_square(0, 2), make_square(4, 2));
        assert!(pos.gives_check(m));

        // (c) direct chariot check.
        let pos = Position::from_fen("4k4/9/9/9/9/9/9/R8/9/3K5 w - - 0 1").unwrap();
        let m = Move::new(make_square(0, 2), make_square(0, 9));
        assert!(pos.gives_check(m));
        assert!(!pos.gives_cannon_check(m));
    }

    #[test]
    fn test_do_move_updates_keys_and_material() {
        setup();
        let mut pos = Position::from_fen("4k4/9/9/9/9/9/9/2r6/9/R3K4 w - - 0 1").unwrap();
        let npm_black = pos.non_pawn_material(Color::Black);
        let quiet = Move::new(make_square(0, 0), make_square(0, 9));
        let gc = pos.gives_check(quiet);
        pos.do_move(quiet, gc);
        assert_eq!(pos.non_pawn_material(Color::Black), npm_black);
        assert_eq!(pos.captured_piece(), NO_PIECE);
        pos.undo_move(quiet);

        let mut pos = Position::from_fen("4k4/9/9/9/9/9/9/R1r6/9/4K4 w - - 0 1").unwrap();
        let m = Move::new(make_square(0, 2), make_square(2, 2));
        assert!(pos.pseudo_legal(m));
        assert!(pos.legal(m));
        let npm_before = pos.non_pawn_material(Color::Black);
        let gc = pos.gives_check(m);
        pos.do_move(m, gc);
        assert_eq!(pos.captured_piece(), B_CHARIOT);
        assert_eq!(
            pos.non_pawn_material(Color::Black),
            npm_before - piece_value_mg(B_CHARIOT)
        );
        pos.undo_move(m);
        assert_eq!(pos.non_pawn_material(Color::Black), npm_before);
    }

    #[test]
    fn test_null_move_round_trip() {
        setup();
        let mut pos = Position::startpos();
        let key = pos.key();
        let side = pos.side_to_move();
        pos.do_null_move();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), side.opposite());
        assert_eq!(pos.st().plies_from_null, 0);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), side);
    }

    #[test]
    fn test_repetition_draw() {
        setup();
        let mut pos = Position::from_fen("3k5/9/9/9/9/9/9/9/9/R3K4 w - - 0 1").unwrap();
        let wr_out = Move::new(make_square(0, 0), make_square(0, 1));
        let bk_out = Move::new(make_square(3, 9), make_square(3, 8));
        let wr_back = Move::new(make_square(0, 1), make_square(0, 0));
        let bk_back = Move::new(make_square(3, 8), make_square(3, 9));
        for m in [wr_out, bk_out, wr_back, bk_back] {
            assert!(!pos.is_draw());
            let gc = pos.gives_check(m);
            pos.do_move(m, gc);
        }
        assert!(pos.is_draw());
    }

    #[test]
    fn test_key_after_matches_do_move() {
        setup();
        let mut pos = Position::from_fen("4k4/9/9/9/9/9/9/R1r6/9/4K4 w - - 0 1").unwrap();
        for m in [
            Move::new(make_square(0, 2), make_square(2, 2)),
            Move::new(make_square(0, 2), make_square(0, 5)),
        ] {
            let predicted = pos.key_after(m);
            let gc = pos.gives_check(m);
            pos.do_move(m, gc);
            assert_eq!(pos.key(), predicted);
            pos.undo_move(m);
        }
    }

    #[test]
    fn test_legal_moves_resolve_check() {
        setup();
        // Property: every legal move from a checked position leaves zero
        // checkers behind.
        let fens = [
            "R3k4/9/9/9/9/9/9/9/9/3K5 b - - 0 1", // chariot check along the 10th rank
            "4k4/9/4p4/9/9/9/9/4C4/9/3K5 b - - 0 1", // cannon check through the e8 soldier
            "4k4/4n4/9/9/9/9/9/9/9/3K5 b - - 0 1", // quiet position, property still holds
            "3k5/9/4N4/9/9/9/9/9/9/4K4 b - - 0 1", // horse check, leg block is an evasion
        ];
        for fen in fens {
            let mut pos = Position::from_fen(fen).unwrap();
            let moves = MoveList::new(&pos, GenType::Legal);
            for m in moves.iter() {
                let gc = pos.gives_check(m.mv);
                pos.do_move(m.mv, gc);
                let us = pos.side_to_move().opposite();
                assert_eq!(
                    pos.attackers_to(pos.general_square(us)) & pos.pieces(us.opposite()),
                    EMPTY,
                    "move {}{} fails to resolve check in {}",
                    square_to_string(m.mv.from()),
                    square_to_string(m.mv.to()),
                    fen
                );
                pos.undo_move(m.mv);
            }
        }
    }

    #[test]
    fn test_pseudo_legal_rejects_garbage() {
        setup();
        let pos = Position::startpos();
        assert!(!pos.pseudo_legal(Move::NONE));
        assert!(!pos.pseudo_legal(Move::NULL));
        // Enemy piece as mover.
        assert!(!pos.pseudo_legal(Move::new(make_square(0, 9), make_square(0, 8))));
        // Own piece on the target square.
        assert!(!pos.pseudo_legal(Move::new(make_square(0, 0), make_square(0, 3))));
        // Chariot jumping over the soldier.
        assert!(!pos.pseudo_legal(Move::new(make_square(0, 0), make_square(0, 5))));
        // Quiet cannon slide is fine; cannon "capture" of empty square via
        // jump semantics is not.
        let pos2 = Position::from_fen("4k4/9/4p4/9/9/9/9/4C4/9/3K5 w - - 0 1").unwrap();
        assert!(pos2.pseudo_legal(Move::new(make_square(4, 2), make_square(4, 6))));
        assert!(pos2.pseudo_legal(Move::new(make_square(4, 2), make_square(4, 9))));
        assert!(!pos2.pseudo_legal(Move::new(make_square(4, 2), make_square(4, 8))));
    }

    #[test]
    fn test_soldier_predicates() {
        setup();
        let pos = Position::startpos();
        // The e4 soldier runs into the e7 soldier on its file.
        assert!(!pos.soldier_passed(Color::White, make_square(4, 3)));

        let pos = Position::from_fen("4k4/9/9/9/4P4/9/9/9/9/4K4 w - - 0 1").unwrap();
        assert!(pos.soldier_passed(Color::White, make_square(4, 5)));
        assert!(pos.advanced_soldier_push(Move::new(make_square(4, 5), make_square(4, 6))));
    }

    #[test]
    fn test_game_phase_bounds() {
        setup();
        let start = Position::startpos();
        assert_eq!(start.game_phase(), PHASE_MIDGAME);
        let bare = Position::from_fen("4k4/9/9/9/9/9/9/9/9/4K4 w - - 0 1").unwrap();
        assert_eq!(bare.game_phase(), 0);
    }
}
