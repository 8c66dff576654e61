//! The Prisoner's Dilemma payoff matrix.

use arena_state::Move;

/// Points for (row player, column player) given both moves.
///
/// | A \ B | C     | D     |
/// |-------|-------|-------|
/// | C     | (3,3) | (0,5) |
/// | D     | (5,0) | (1,1) |
pub fn payoff(a: Move, b: Move) -> (u32, u32) {
    match (a, b) {
        (Move::Cooperate, Move::Cooperate) => (3, 3),
        (Move::Cooperate, Move::Defect) => (0, 5),
        (Move::Defect, Move::Cooperate) => (5, 0),
        (Move::Defect, Move::Defect) => (1, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Move::{Cooperate as C, Defect as D};

    #[test]
    fn matrix_literals() {
        assert_eq!(payoff(C, C), (3, 3));
        assert_eq!(payoff(C, D), (0, 5));
        assert_eq!(payoff(D, C), (5, 0));
        assert_eq!(payoff(D, D), (1, 1));
    }

    #[test]
    fn matrix_is_symmetric_under_side_swap() {
        for a in [C, D] {
            for b in [C, D] {
                let (x, y) = payoff(a, b);
                assert_eq!(payoff(b, a), (y, x));
            }
        }
    }
}
