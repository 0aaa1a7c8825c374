use arrayvec::ArrayVec;

use crate::board::bitboard::*;
use crate::board::position::{make_piece, type_of, Color, Move, PieceType, Position, MAX_MOVES};
use crate::movegen::attacks::{
    between_bb, chariot_attacks, line_bb, pseudo_attacks, step_attacks,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    Captures,
    Quiets,
    QuietChecks,
    Evasions,
    NonEvasions,
    Legal,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtMove {
    pub mv: Move,
    pub value: i32,
}

pub type MoveVec = ArrayVec<ExtMove, MAX_MOVES>;

#[inline(always)]
fn push(list: &mut MoveVec, from: Square, to: Square) {
    list.push(ExtMove {
        mv: Move::new(from, to),
        value: 0,
    });
}

/// Wrapper around generate() holding the produced moves.
pub struct MoveList {
    moves: MoveVec,
}

impl MoveList {
    pub fn new(pos: &Position, gen: GenType) -> MoveList {
        let mut moves = MoveVec::new();
        generate(pos, gen, &mut moves);
        MoveList { moves }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    #[inline(always)]
    pub fn iter(&self) -> std::slice::Iter<'_, ExtMove> {
        self.moves.iter()
    }

    pub fn contains(&self, m: Move) -> bool {
        self.moves.iter().any(|em| em.mv == m)
    }
}

impl<'a> IntoIterator for &'a MoveList {
    type Item = &'a ExtMove;
    type IntoIter = std::slice::Iter<'a, ExtMove>;

    fn into_iter(self) -> Self::IntoIter {
        self.moves.iter()
    }
}

pub fn generate(pos: &Position, gen: GenType, list: &mut MoveVec) {
    let us = pos.side_to_move();
    match gen {
        GenType::Captures => {
            let target = pos.pieces(us.opposite());
            generate_all(pos, us, target, false, EMPTY, true, list);
        }
        GenType::Quiets => {
            let target = !pos.all_pieces() & BOARD;
            generate_all(pos, us, target, false, EMPTY, true, list);
        }
        GenType::NonEvasions => {
            let target = !pos.pieces(us) & BOARD;
            generate_all(pos, us, target, false, EMPTY, true, list);
        }
        GenType::QuietChecks => generate_quiet_checks(pos, list),
        GenType::Evasions => generate_evasions(pos, list),
        GenType::Legal => generate_legal(pos, list),
    }
}

/// Runs the per-type generators over `target`. In checks mode destinations
/// are narrowed to direct-check squares plus `interpose` (squares that screen
/// a friendly cannon onto the enemy general), and discovered-check candidates
/// are skipped since the caller emits them separately.
fn generate_all(
    pos: &Position,
    us: Color,
    target: Bitboard,
    checks: bool,
    interpose: Bitboard,
    with_general: bool,
    list: &mut MoveVec,
) {
    for pt in [
        PieceType::Soldier,
        PieceType::Elephant,
        PieceType::Advisor,
        PieceType::Horse,
        PieceType::Cannon,
        PieceType::Chariot,
    ] {
        generate_piece_moves(pos, us, pt, target, checks, interpose, list);
    }

    if with_general {
        let ksq = pos.general_square(us);
        let mut b = step_attacks(make_piece(us, PieceType::General), ksq) & target;
        while b != 0 {
            push(list, ksq, pop_lsb(&mut b));
        }
    }
}

fn generate_piece_moves(
    pos: &Position,
    us: Color,
    pt: PieceType,
    target: Bitboard,
    checks: bool,
    interpose: Bitboard,
    list: &mut MoveVec,
) {
    let pc = make_piece(us, pt);
    let them = us.opposite();
    let their_ksq = pos.general_square(them);
    let occupied = pos.all_pieces();

    for &from in pos.piece_squares(pc) {
        if checks {
            // Reachability prune for the long movers.
            if matches!(pt, PieceType::Horse | PieceType::Chariot | PieceType::Cannon) {
                let reach = if pt == PieceType::Horse {
                    pseudo_attacks(PieceType::Horse, from)
                } else {
                    pseudo_attacks(PieceType::Chariot, from)
                };
                if reach & target & (pos.check_squares(pt) | interpose) == 0 {
                    continue;
                }
            }
            if pos.discovered_check_candidates() & square_bb(from) != 0 {
                continue;
            }
        }

        let mut b = match pt {
            PieceType::Cannon => {
                (pos.attacks_from(pc, from) & target & pos.pieces(them))
                    | (chariot_attacks(from, occupied) & target & !occupied)
            }
            PieceType::Soldier => step_attacks(pc, from) & target,
            _ => pos.attacks_from(pc, from) & target,
        };

        if checks {
            // A mover sliding along its own line to the general opens
            // nothing, so interpose squares collinear with it are excluded.
            b &= pos.check_squares(pt) | (interpose & !line_bb(from, their_ksq));
        }

        while b != 0 {
            push(list, from, pop_lsb(&mut b));
        }
    }
}

/// Quiet moves giving check: discovered checks, direct checks, and friendly
/// interpositions that hand a screen to a cannon already facing the enemy
/// general.
fn generate_quiet_checks(pos: &Position, list: &mut MoveVec) {
    let us = pos.side_to_move();
    let their_ksq = pos.general_square(us.opposite());
    let occupied = pos.all_pieces();

    let mut dc = pos.discovered_check_candidates();
    while dc != 0 {
        let from = pop_lsb(&mut dc);
        let pc = pos.piece_at(from);
        let pt = type_of(pc);

        let mut b = if pt == PieceType::Cannon {
            chariot_attacks(from, occupied) & !occupied
        } else {
            pos.attacks_from(pc, from) & !occupied
        };
        // Staying on the line towards the general uncovers nothing.
        b &= !line_bb(from, their_ksq);

        while b != 0 {
            push(list, from, pop_lsb(&mut b));
        }
    }

    let mut interpose = EMPTY;
    for &csq in pos.piece_squares(make_piece(us, PieceType::Cannon)) {
        if line_bb(csq, their_ksq) != 0 && between_bb(csq, their_ksq) & occupied == 0 {
            interpose |= between_bb(csq, their_ksq);
        }
    }

    generate_all(pos, us, !occupied & BOARD, true, interpose, false, list);
}

/// Check evasions: king steps off the checking rays, then blocks and
/// captures. A checking horse can also be disarmed by occupying its leg, and
/// the screen of a checking cannon may flee the line entirely.
fn generate_evasions(pos: &Position, list: &mut MoveVec) {
    let us = pos.side_to_move();
    let ksq = pos.general_square(us);

    let mut slider_attacks = EMPTY;
    let mut sliders =
        pos.checkers() & pos.pieces_of_types(PieceType::Chariot, PieceType::Cannon);
    while sliders != 0 {
        let checksq = pop_lsb(&mut sliders);
        slider_attacks |= line_bb(checksq, ksq) ^ square_bb(checksq);
    }

    let mut b =
        step_attacks(make_piece(us, PieceType::General), ksq) & !pos.pieces(us) & !slider_attacks;
    while b != 0 {
        push(list, ksq, pop_lsb(&mut b));
    }

    if more_than_one(pos.checkers()) {
        let mut ch = pos.checkers();
        let first = pop_lsb(&mut ch);
        let second = lsb(ch);
        // Only a chariot with a cannon stacked behind it can be answered by
        // anything except a king move.
        if !crate::movegen::attacks::aligned(first, second, ksq) {
            return;
        }
    }

    let checksq = pos.closest_checker(ksq);
    let target = pos.evasion_block_targets(ksq, checksq) & !pos.pieces(us);

    if type_of(pos.piece_at(checksq)) == PieceType::Cannon {
        let screen = between_bb(checksq, ksq) & pos.all_pieces();
        if screen & pos.pieces(us) != 0 {
            let ssq = lsb(screen);
            let pc = pos.piece_at(ssq);
            let occupied = pos.all_pieces();
            let mut b = if type_of(pc) == PieceType::Cannon {
                (pos.attacks_from(pc, ssq) & pos.pieces(us.opposite()))
                    | (chariot_attacks(ssq, occupied) & !occupied)
            } else {
                pos.attacks_from(pc, ssq)
            };
            b &= !pos.pieces(us) & !line_bb(checksq, ksq);
            while b != 0 {
                push(list, ssq, pop_lsb(&mut b));
            }
        }
    }

    generate_all(pos, us, target, false, EMPTY, false, list);
}

fn generate_legal(pos: &Position, list: &mut MoveVec) {
    if pos.checkers() != 0 {
        generate(pos, GenType::Evasions, list);
    } else {
        generate(pos, GenType::NonEvasions, list);
    }
    list.retain(|em| pos.legal(em.mv));
}
