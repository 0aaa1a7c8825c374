use crate::board::bitboard::*;
use crate::board::position::{color_of, type_of, Move, PieceType, Position};
use crate::eval::psqt::{piece_type_value_mg, piece_value_mg};
use crate::movegen::attacks::{cannon_attacks, chariot_attacks};

const ATTACKER_ORDER: [PieceType; 6] = [
    PieceType::Soldier,
    PieceType::Horse,
    PieceType::Elephant,
    PieceType::Cannon,
    PieceType::Chariot,
    PieceType::Advisor,
];

/// Removes the least valuable attacker of the side to move from `occupied`
/// and folds freshly uncovered X-ray attackers back in. Chariot attacks only
/// grow when a piece leaves the line; cannon attacks can appear or vanish
/// with the screen, so they are recomputed outright.
fn min_attacker(
    pos: &Position,
    to: Square,
    stm_attackers: Bitboard,
    occupied: &mut Bitboard,
    attackers: &mut Bitboard,
) -> PieceType {
    for pt in ATTACKER_ORDER {
        let b = stm_attackers & pos.pieces_of_type(pt);
        if b != 0 {
            *occupied ^= b & b.wrapping_neg();

            *attackers |= chariot_attacks(to, *occupied) & pos.pieces_of_type(PieceType::Chariot);
            *attackers = (*attackers & !pos.pieces_of_type(PieceType::Cannon))
                | (cannon_attacks(to, *occupied) & pos.pieces_of_type(PieceType::Cannon));
            // The X-ray sweep may resurrect already removed pieces.
            *attackers &= *occupied;

            return pt;
        }
    }
    PieceType::General
}

/// Static exchange evaluation: does the capture sequence started by `m` come
/// out at `threshold` or better for the side making it? Pinned pieces stay
/// out of the exchange while their pinner is still on the board.
pub fn see_ge(pos: &Position, m: Move, threshold: i32) -> bool {
    let from = m.from();
    let to = m.to();
    let mut next_victim = type_of(pos.piece_at(from));
    let mut stm = color_of(pos.piece_at(from)).opposite();
    let mut balance = piece_value_mg(pos.piece_at(to));

    if balance < threshold {
        return false;
    }

    if next_victim == PieceType::General {
        return true;
    }

    balance -= piece_type_value_mg(next_victim);

    if balance >= threshold {
        return true;
    }

    // True while the side not making the original move is to move.
    let mut relative_stm = true;
    let mut occupied = pos.all_pieces() ^ square_bb(from) ^ square_bb(to);
    let mut attackers = pos.attackers_to_occ(to, occupied) & occupied;

    loop {
        let mut stm_attackers = attackers & pos.pieces(stm);

        if pos.pinners_for_king(stm) & !occupied == 0 {
            stm_attackers &= !pos.blockers_for_king(stm);
        }

        if stm_attackers == 0 {
            return relative_stm;
        }

        next_victim = min_attacker(pos, to, stm_attackers, &mut occupied, &mut attackers);

        if next_victim == PieceType::General {
            // A general capture ends the sequence; it only stands when the
            // opponent has no reply.
            return relative_stm == (attackers & pos.pieces(stm.opposite()) != 0);
        }

        balance += if relative_stm {
            piece_type_value_mg(next_victim)
        } else {
            -piece_type_value_mg(next_victim)
        };

        relative_stm = !relative_stm;

        if relative_stm == (balance >= threshold) {
            return relative_stm;
        }

        stm = stm.opposite();
    }
}
