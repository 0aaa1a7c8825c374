use crate::board::bitboard::*;
use crate::board::position::{make_piece, Color, Piece, PieceType, PIECE_NB};

// Squares an elephant may ever occupy: seven per side, none across the river.
pub const ELEPHANT_SQUARES: Bitboard = square_bb(2)
    | square_bb(6)
    | square_bb(18)
    | square_bb(22)
    | square_bb(26)
    | square_bb(38)
    | square_bb(42)
    | square_bb(47)
    | square_bb(51)
    | square_bb(63)
    | square_bb(67)
    | square_bb(71)
    | square_bb(83)
    | square_bb(87);

static mut CHARIOT_MASKS: [Bitboard; 90] = [0; 90];
static mut CHARIOT_ATTACKS: [Vec<Bitboard>; 90] = [const { Vec::new() }; 90];

static mut CANNON_MASKS: [Bitboard; 90] = [0; 90];
static mut CANNON_ATTACKS: [Vec<Bitboard>; 90] = [const { Vec::new() }; 90];

static mut HORSE_MASKS: [Bitboard; 90] = [0; 90];
static mut HORSE_ATTACKS: [Vec<Bitboard>; 90] = [const { Vec::new() }; 90];

static mut ELEPHANT_MASKS: [Bitboard; 90] = [0; 90];
static mut ELEPHANT_ATTACKS: [Vec<Bitboard>; 90] = [const { Vec::new() }; 90];

static mut STEP_ATTACKS: [[Bitboard; 90]; PIECE_NB] = [[0; 90]; PIECE_NB];
static mut PSEUDO_ATTACKS: [[Bitboard; 90]; 8] = [[0; 90]; 8];

static mut BETWEEN_BB: [[Bitboard; 90]; 90] = [[0; 90]; 90];
static mut LINE_BB: [[Bitboard; 90]; 90] = [[0; 90]; 90];

static mut ADJACENT_FILES_BB: [Bitboard; 9] = [0; 9];
static mut IN_FRONT_BB: [[Bitboard; 10]; 2] = [[0; 10]; 2];
static mut FORWARD_BB: [[Bitboard; 90]; 2] = [[0; 90]; 2];
static mut SOLDIER_ATTACK_SPAN: [[Bitboard; 90]; 2] = [[0; 90]; 2];
static mut PASSED_SOLDIER_MASK: [[Bitboard; 90]; 2] = [[0; 90]; 2];
static mut DISTANCE_RING_BB: [[Bitboard; 10]; 90] = [[0; 10]; 90];

static INIT: std::sync::Once = std::sync::Once::new();

#[inline(always)]
fn offset(s: Square, df: i32, dr: i32) -> Square {
    let f = file_of(s) as i32 + df;
    let r = rank_of(s) as i32 + dr;
    if (0..9).contains(&f) && (0..10).contains(&r) {
        make_square(f as u8, r as u8)
    } else {
        SQ_NONE
    }
}

#[inline(always)]
fn in_palace(c: u8, s: Square) -> bool {
    (3..=5).contains(&file_of(s)) && relative_rank_of(c, s) <= 2
}

#[inline(always)]
fn same_river_side(s1: Square, s2: Square) -> bool {
    (rank_of(s1) <= 4) == (rank_of(s2) <= 4)
}

const ORTHOGONALS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
const DIAGONALS: [(i32, i32); 4] = [(1, 1), (-1, 1), (1, -1), (-1, -1)];

/// Chariot rays by direct walking; inclusive of the first blocker.
pub fn chariot_attacks_slow(s: Square, occupied: Bitboard) -> Bitboard {
    let mut attacks = EMPTY;
    for &(df, dr) in &ORTHOGONALS {
        let mut t = offset(s, df, dr);
        while t != SQ_NONE {
            set_bit(&mut attacks, t);
            if has_bit(occupied, t) {
                break;
            }
            t = offset(t, df, dr);
        }
    }
    attacks
}

/// Cannon rays by direct walking. The attack set holds every square lying
/// behind exactly one screen: empty squares there are controlled, and the
/// second piece on the ray is the capture target.
pub fn cannon_attacks_slow(s: Square, occupied: Bitboard) -> Bitboard {
    let mut attacks = EMPTY;
    for &(df, dr) in &ORTHOGONALS {
        let mut screen_found = false;
        let mut t = offset(s, df, dr);
        while t != SQ_NONE {
            if !screen_found {
                screen_found = has_bit(occupied, t);
            } else {
                set_bit(&mut attacks, t);
                if has_bit(occupied, t) {
                    break;
                }
            }
            t = offset(t, df, dr);
        }
    }
    attacks
}

/// Horse destinations by direct walking; a destination is unreachable when
/// its leg square is occupied. An occupied destination is still attacked.
pub fn horse_attacks_slow(s: Square, occupied: Bitboard) -> Bitboard {
    let mut attacks = EMPTY;
    for &(df, dr) in &ORTHOGONALS {
        let leg = offset(s, df, dr);
        if leg == SQ_NONE || has_bit(occupied, leg) {
            continue;
        }
        let dests = if df == 0 {
            [offset(s, 1, 2 * dr), offset(s, -1, 2 * dr)]
        } else {
            [offset(s, 2 * df, 1), offset(s, 2 * df, -1)]
        };
        for d in dests {
            if d != SQ_NONE {
                set_bit(&mut attacks, d);
            }
        }
    }
    attacks
}

/// Elephant destinations by direct walking: two diagonal steps, blocked by an
/// occupied eye, confined to the canonical squares on the mover's own river
/// side. Occupied destinations are attacked (captures are normal).
pub fn elephant_attacks_slow(s: Square, occupied: Bitboard) -> Bitboard {
    let mut attacks = EMPTY;
    for &(df, dr) in &DIAGONALS {
        let eye = offset(s, df, dr);
        if eye == SQ_NONE || has_bit(occupied, eye) {
            continue;
        }
        let dest = offset(s, 2 * df, 2 * dr);
        if dest != SQ_NONE && has_bit(ELEPHANT_SQUARES, dest) && same_river_side(s, dest) {
            set_bit(&mut attacks, dest);
        }
    }
    attacks
}

fn chariot_mask(s: Square) -> Bitboard {
    let edges = ((RANK_1 | RANK_10) & !rank_bb(rank_of(s))) | ((FILE_A | FILE_I) & !file_bb(file_of(s)));
    chariot_attacks_slow(s, EMPTY) & !edges
}

fn horse_mask(s: Square) -> Bitboard {
    let mut mask = EMPTY;
    for &(df, dr) in &ORTHOGONALS {
        let leg = offset(s, df, dr);
        if leg == SQ_NONE {
            continue;
        }
        let dests = if df == 0 {
            [offset(s, 1, 2 * dr), offset(s, -1, 2 * dr)]
        } else {
            [offset(s, 2 * df, 1), offset(s, 2 * df, -1)]
        };
        if dests.iter().any(|&d| d != SQ_NONE) {
            set_bit(&mut mask, leg);
        }
    }
    mask
}

fn elephant_mask(s: Square) -> Bitboard {
    let mut mask = EMPTY;
    for &(df, dr) in &DIAGONALS {
        let eye = offset(s, df, dr);
        let dest = offset(s, 2 * df, 2 * dr);
        if eye != SQ_NONE
            && dest != SQ_NONE
            && has_bit(ELEPHANT_SQUARES, dest)
            && same_river_side(s, dest)
        {
            set_bit(&mut mask, eye);
        }
    }
    mask
}

/// Fills one PEXT-indexed table: every subset of the relevance mask is
/// enumerated with the Carry-Rippler and mapped to its ray-walked attack set.
fn init_table(
    masks: &mut [Bitboard; 90],
    attacks: &mut [Vec<Bitboard>; 90],
    mask_fn: fn(Square) -> Bitboard,
    attack_fn: fn(Square, Bitboard) -> Bitboard,
) {
    for s in 0..SQUARE_NB {
        let mask = mask_fn(s);
        masks[s as usize] = mask;
        attacks[s as usize] = vec![EMPTY; 1 << popcount(mask)];

        let mut b = EMPTY;
        loop {
            attacks[s as usize][pext(b, mask) as usize] = attack_fn(s, b);
            b = next_subset(b, mask);
            if b == 0 {
                break;
            }
        }
    }
}

fn init_step_attacks() {
    unsafe {
        for c in 0..2u8 {
            let forward = if c == 0 { 1 } else { -1 };

            for s in 0..SQUARE_NB {
                let soldier = make_piece(Color::from(c), PieceType::Soldier) as usize;
                let to = offset(s, 0, forward);
                if to != SQ_NONE {
                    set_bit(&mut STEP_ATTACKS[soldier][s as usize], to);
                }
                // Sideways steps only after crossing the river.
                if relative_rank_of(c, s) > 4 {
                    for df in [1, -1] {
                        let to = offset(s, df, 0);
                        if to != SQ_NONE {
                            set_bit(&mut STEP_ATTACKS[soldier][s as usize], to);
                        }
                    }
                }

                let advisor = make_piece(Color::from(c), PieceType::Advisor) as usize;
                let general = make_piece(Color::from(c), PieceType::General) as usize;
                if in_palace(c, s) {
                    for &(df, dr) in &DIAGONALS {
                        let to = offset(s, df, dr);
                        if to != SQ_NONE && in_palace(c, to) {
                            set_bit(&mut STEP_ATTACKS[advisor][s as usize], to);
                        }
                    }
                    for &(df, dr) in &ORTHOGONALS {
                        let to = offset(s, df, dr);
                        if to != SQ_NONE && in_palace(c, to) {
                            set_bit(&mut STEP_ATTACKS[general][s as usize], to);
                        }
                    }
                }
            }
        }
    }
}

fn init_geometry() {
    unsafe {
        for f in 0..9u8 {
            let mut bb = EMPTY;
            if f > 0 {
                bb |= file_bb(f - 1);
            }
            if f < 8 {
                bb |= file_bb(f + 1);
            }
            ADJACENT_FILES_BB[f as usize] = bb;
        }

        for r in 0..9u8 {
            IN_FRONT_BB[1][r as usize + 1] = IN_FRONT_BB[1][r as usize] | rank_bb(r);
            IN_FRONT_BB[0][r as usize] = !IN_FRONT_BB[1][r as usize + 1] & BOARD;
        }

        for c in 0..2usize {
            for s in 0..SQUARE_NB {
                FORWARD_BB[c][s as usize] =
                    IN_FRONT_BB[c][rank_of(s) as usize] & file_bb(file_of(s));
                let sideways = if relative_rank_of(c as u8, s) > 4 {
                    rank_bb(rank_of(s))
                } else {
                    EMPTY
                };
                SOLDIER_ATTACK_SPAN[c][s as usize] = sideways | FORWARD_BB[c][s as usize];
                PASSED_SOLDIER_MASK[c][s as usize] = SOLDIER_ATTACK_SPAN[c][s as usize];
            }
        }

        for s1 in 0..SQUARE_NB {
            for s2 in 0..SQUARE_NB {
                if s1 != s2 {
                    let d = square_distance(s1, s2);
                    set_bit(&mut DISTANCE_RING_BB[s1 as usize][d as usize - 1], s2);
                }
            }
        }
    }
}

pub fn init_attacks() {
    INIT.call_once(|| unsafe {
        init_table(
            &mut CHARIOT_MASKS,
            &mut CHARIOT_ATTACKS,
            chariot_mask,
            chariot_attacks_slow,
        );
        // A blocker on a ray's edge square never changes the cannon's attack
        // set, so the chariot relevance mask serves the cannon as well.
        init_table(
            &mut CANNON_MASKS,
            &mut CANNON_ATTACKS,
            chariot_mask,
            cannon_attacks_slow,
        );
        init_table(
            &mut HORSE_MASKS,
            &mut HORSE_ATTACKS,
            horse_mask,
            horse_attacks_slow,
        );
        init_table(
            &mut ELEPHANT_MASKS,
            &mut ELEPHANT_ATTACKS,
            elephant_mask,
            elephant_attacks_slow,
        );

        init_step_attacks();
        init_geometry();

        for s in 0..SQUARE_NB {
            PSEUDO_ATTACKS[PieceType::Chariot as usize][s as usize] =
                chariot_attacks_slow(s, EMPTY);
            PSEUDO_ATTACKS[PieceType::Horse as usize][s as usize] = horse_attacks_slow(s, EMPTY);
            PSEUDO_ATTACKS[PieceType::Elephant as usize][s as usize] =
                elephant_attacks_slow(s, EMPTY);

            let mut surrounding = EMPTY;
            for &(df, dr) in &ORTHOGONALS {
                let t = offset(s, df, dr);
                if t != SQ_NONE {
                    set_bit(&mut surrounding, t);
                }
            }
            PSEUDO_ATTACKS[PieceType::Cannon as usize][s as usize] =
                PSEUDO_ATTACKS[PieceType::Chariot as usize][s as usize] & !surrounding;
        }

        for s1 in 0..SQUARE_NB {
            for s2 in 0..SQUARE_NB {
                if !has_bit(PSEUDO_ATTACKS[PieceType::Chariot as usize][s1 as usize], s2) {
                    continue;
                }
                LINE_BB[s1 as usize][s2 as usize] = (chariot_attacks_slow(s1, EMPTY)
                    & chariot_attacks_slow(s2, EMPTY))
                    | square_bb(s1)
                    | square_bb(s2);
                BETWEEN_BB[s1 as usize][s2 as usize] = chariot_attacks_slow(s1, square_bb(s2))
                    & chariot_attacks_slow(s2, square_bb(s1));
            }
        }
    });
}

#[inline(always)]
pub fn chariot_attacks(s: Square, occupied: Bitboard) -> Bitboard {
    unsafe {
        let idx = pext(occupied, CHARIOT_MASKS[s as usize]) as usize;
        CHARIOT_ATTACKS[s as usize][idx]
    }
}

#[inline(always)]
pub fn cannon_attacks(s: Square, occupied: Bitboard) -> Bitboard {
    unsafe {
        let idx = pext(occupied, CANNON_MASKS[s as usize]) as usize;
        CANNON_ATTACKS[s as usize][idx]
    }
}

#[inline(always)]
pub fn horse_attacks(s: Square, occupied: Bitboard) -> Bitboard {
    unsafe {
        let idx = pext(occupied, HORSE_MASKS[s as usize]) as usize;
        HORSE_ATTACKS[s as usize][idx]
    }
}

#[inline(always)]
pub fn elephant_attacks(s: Square, occupied: Bitboard) -> Bitboard {
    unsafe {
        let idx = pext(occupied, ELEPHANT_MASKS[s as usize]) as usize;
        ELEPHANT_ATTACKS[s as usize][idx]
    }
}

#[inline(always)]
pub fn attack_mask(pt: PieceType, s: Square) -> Bitboard {
    unsafe {
        match pt {
            PieceType::Chariot => CHARIOT_MASKS[s as usize],
            PieceType::Cannon => CANNON_MASKS[s as usize],
            PieceType::Horse => HORSE_MASKS[s as usize],
            PieceType::Elephant => ELEPHANT_MASKS[s as usize],
            _ => EMPTY,
        }
    }
}

#[inline(always)]
pub fn step_attacks(pc: Piece, s: Square) -> Bitboard {
    unsafe { STEP_ATTACKS[pc as usize][s as usize] }
}

#[inline(always)]
pub fn pseudo_attacks(pt: PieceType, s: Square) -> Bitboard {
    unsafe { PSEUDO_ATTACKS[pt as usize][s as usize] }
}

/// Attacks for any piece under the given occupancy.
#[inline(always)]
pub fn attacks_bb(pc: Piece, s: Square, occupied: Bitboard) -> Bitboard {
    match PieceType::from(pc & 7) {
        PieceType::Chariot => chariot_attacks(s, occupied),
        PieceType::Cannon => cannon_attacks(s, occupied),
        PieceType::Horse => horse_attacks(s, occupied),
        PieceType::Elephant => elephant_attacks(s, occupied),
        _ => step_attacks(pc, s),
    }
}

#[inline(always)]
pub fn between_bb(s1: Square, s2: Square) -> Bitboard {
    unsafe { BETWEEN_BB[s1 as usize][s2 as usize] }
}

#[inline(always)]
pub fn line_bb(s1: Square, s2: Square) -> Bitboard {
    unsafe { LINE_BB[s1 as usize][s2 as usize] }
}

/// True when s1, s2, s3 share a file or rank.
#[inline(always)]
pub fn aligned(s1: Square, s2: Square, s3: Square) -> bool {
    line_bb(s1, s2) & square_bb(s3) != 0
}

#[inline(always)]
pub fn adjacent_files_bb(f: u8) -> Bitboard {
    unsafe { ADJACENT_FILES_BB[f as usize] }
}

#[inline(always)]
pub fn in_front_bb(c: u8, r: u8) -> Bitboard {
    unsafe { IN_FRONT_BB[c as usize][r as usize] }
}

#[inline(always)]
pub fn forward_bb(c: u8, s: Square) -> Bitboard {
    unsafe { FORWARD_BB[c as usize][s as usize] }
}

#[inline(always)]
pub fn soldier_attack_span(c: u8, s: Square) -> Bitboard {
    unsafe { SOLDIER_ATTACK_SPAN[c as usize][s as usize] }
}

#[inline(always)]
pub fn passed_soldier_mask(c: u8, s: Square) -> Bitboard {
    unsafe { PASSED_SOLDIER_MASK[c as usize][s as usize] }
}

#[inline(always)]
pub fn distance_ring_bb(s: Square, d: u8) -> Bitboard {
    unsafe { DISTANCE_RING_BB[s as usize][d as usize] }
}

/// Leg square a horse on `from` passes through to reach `to`.
#[inline(always)]
pub fn horse_leg(from: Square, to: Square) -> Square {
    if rank_of(to) == rank_of(from) + 2 {
        offset(from, 0, 1)
    } else if rank_of(from) == rank_of(to) + 2 {
        offset(from, 0, -1)
    } else if file_of(to) == file_of(from) + 2 {
        offset(from, 1, 0)
    } else if file_of(from) == file_of(to) + 2 {
        offset(from, -1, 0)
    } else {
        SQ_NONE
    }
}
