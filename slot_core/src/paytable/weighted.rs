//! Three-reel weighted paytable.

use super::{LineWin, PaytableError, PaytableEvaluator, SpinOutcome, Symbol};
use rand::{
    RngCore,
    distr::{Distribution, weighted::WeightedIndex},
};

pub const REELS: usize = 3;
pub const ROWS: usize = 3;

/// Row index per reel: three horizontal lines and two diagonals
pub const PAYLINES: [[usize; REELS]; 5] = [
    [0, 0, 0],
    [1, 1, 1],
    [2, 2, 2],
    [0, 1, 2],
    [2, 1, 0],
];

/// Weight and line multipliers of one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolSpec {
    pub symbol: Symbol,
    pub weight: u32,
    /// Multiplier for three of a kind
    pub three_kind: i64,
    /// Multiplier when only the first two reels match
    pub two_kind: i64,
}

const CLASSIC: [SymbolSpec; 7] = [
    SymbolSpec { symbol: Symbol::Cherry, weight: 30, three_kind: 5, two_kind: 1 },
    SymbolSpec { symbol: Symbol::Lemon, weight: 25, three_kind: 10, two_kind: 0 },
    SymbolSpec { symbol: Symbol::Orange, weight: 20, three_kind: 15, two_kind: 0 },
    SymbolSpec { symbol: Symbol::Plum, weight: 15, three_kind: 20, two_kind: 0 },
    SymbolSpec { symbol: Symbol::Bell, weight: 8, three_kind: 50, two_kind: 0 },
    SymbolSpec { symbol: Symbol::Bar, weight: 5, three_kind: 100, two_kind: 0 },
    SymbolSpec { symbol: Symbol::Seven, weight: 2, three_kind: 500, two_kind: 0 },
];

/// Paytable drawing every cell independently from one weighted symbol strip.
///
/// Each payline pays `bet × multiplier / lines`, rounded down to minor units.
#[derive(Debug, Clone)]
pub struct WeightedPaytable {
    symbols: Vec<SymbolSpec>,
    distribution: WeightedIndex<u32>,
}

impl WeightedPaytable {
    pub fn new(symbols: Vec<SymbolSpec>) -> Result<Self, PaytableError> {
        if symbols
            .iter()
            .any(|s| s.three_kind < 0 || s.two_kind < 0)
        {
            return Err(PaytableError::Invalid(
                "multipliers must be non-negative".to_string(),
            ));
        }

        let distribution = WeightedIndex::new(symbols.iter().map(|s| s.weight))
            .map_err(|e| PaytableError::Invalid(e.to_string()))?;

        Ok(Self {
            symbols,
            distribution,
        })
    }

    /// Seven-symbol classic table
    pub fn classic() -> Result<Self, PaytableError> {
        Self::new(CLASSIC.to_vec())
    }

    fn spec(&self, symbol: Symbol) -> Option<&SymbolSpec> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    /// Evaluate every payline of `grid` for `bet`
    pub fn evaluate(&self, grid: &[Vec<Symbol>], bet: i64) -> Vec<LineWin> {
        let lines = PAYLINES.len() as i64;

        PAYLINES
            .iter()
            .enumerate()
            .filter_map(|(line, rows)| {
                let cells: Vec<Symbol> = rows
                    .iter()
                    .enumerate()
                    .map(|(reel, &row)| grid.get(reel).and_then(|r| r.get(row)).copied())
                    .collect::<Option<_>>()?;

                let first = cells[0];
                let count = cells.iter().take_while(|&&s| s == first).count();
                let spec = self.spec(first)?;
                let multiplier = match count {
                    3 => spec.three_kind,
                    2 => spec.two_kind,
                    _ => 0,
                };

                let payout = bet.checked_mul(multiplier)? / lines;
                (payout > 0).then_some(LineWin {
                    line,
                    symbol: first,
                    count: count as u8,
                    payout,
                })
            })
            .collect()
    }
}

impl PaytableEvaluator for WeightedPaytable {
    fn spin(&self, rng: &mut dyn RngCore, bet: i64) -> SpinOutcome {
        let mut grid = Vec::with_capacity(REELS);
        for _ in 0..REELS {
            let mut reel = Vec::with_capacity(ROWS);
            for _ in 0..ROWS {
                reel.push(self.symbols[self.distribution.sample(&mut *rng)].symbol);
            }
            grid.push(reel);
        }

        let lines = self.evaluate(&grid, bet);
        let win_amount = lines.iter().map(|l| l.payout).sum();

        SpinOutcome {
            grid,
            lines,
            bet_amount: bet,
            win_amount,
            jackpot_win: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn column(s: Symbol) -> Vec<Symbol> {
        vec![s, s, s]
    }

    #[test]
    fn test_full_grid_pays_every_line() {
        let table = WeightedPaytable::classic().unwrap();
        let grid = vec![column(Symbol::Bell); 3];
        let lines = table.evaluate(&grid, 100);

        assert_eq!(lines.len(), 5);
        // 100 * 50 / 5 per line
        assert!(lines.iter().all(|l| l.payout == 1_000 && l.count == 3));
    }

    #[test]
    fn test_two_cherries_pay_small() {
        let table = WeightedPaytable::classic().unwrap();
        let grid = vec![
            vec![Symbol::Cherry, Symbol::Lemon, Symbol::Plum],
            vec![Symbol::Cherry, Symbol::Orange, Symbol::Bar],
            vec![Symbol::Seven, Symbol::Bell, Symbol::Lemon],
        ];
        let lines = table.evaluate(&grid, 50);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 0);
        assert_eq!(lines[0].count, 2);
        assert_eq!(lines[0].payout, 10);
    }

    #[test]
    fn test_no_match_pays_nothing() {
        let table = WeightedPaytable::classic().unwrap();
        let grid = vec![
            vec![Symbol::Lemon, Symbol::Plum, Symbol::Bar],
            vec![Symbol::Orange, Symbol::Bell, Symbol::Seven],
            vec![Symbol::Plum, Symbol::Seven, Symbol::Cherry],
        ];
        assert!(table.evaluate(&grid, 100).is_empty());
    }

    #[test]
    fn test_spin_is_deterministic_for_a_seed() {
        let table = WeightedPaytable::classic().unwrap();
        let a = table.spin(&mut StdRng::seed_from_u64(7), 100);
        let b = table.spin(&mut StdRng::seed_from_u64(7), 100);
        assert_eq!(a, b);
        assert_eq!(a.grid.len(), REELS);
        assert!(a.grid.iter().all(|r| r.len() == ROWS));
        assert_eq!(a.win_amount, a.lines.iter().map(|l| l.payout).sum::<i64>());
    }

    #[test]
    fn test_long_run_rtp_is_bounded() {
        let table = WeightedPaytable::classic().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let spins = 20_000;
        let bet = 100;
        let won: i64 = (0..spins).map(|_| table.spin(&mut rng, bet).win_amount).sum();
        let rtp = won as f64 / (spins * bet) as f64;
        assert!(rtp > 0.0 && rtp < 2.0, "rtp {rtp}");
    }

    #[test]
    fn test_zero_weights_rejected() {
        let specs = CLASSIC.iter().map(|s| SymbolSpec { weight: 0, ..*s }).collect();
        assert!(WeightedPaytable::new(specs).is_err());
    }
}
