use crate::numeric::poisson_pmf_folded;

/// Joint pmf over scorelines `(h, a)` with `h, a in 0..=max_goals`, assuming the two
/// sides score independently. Each marginal has its tail folded into the top
/// bucket, so the grid sums to 1.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    size: usize,
    cells: Vec<f64>,
    home: Vec<f64>,
    away: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl ScoreGrid {
    pub fn from_rates(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Self {
        let home = poisson_pmf_folded(lambda_home, max_goals);
        let away = poisson_pmf_folded(lambda_away, max_goals);
        let size = home.len();
        let mut cells = Vec::with_capacity(size * size);
        for p_h in &home {
            for p_a in &away {
                cells.push(p_h * p_a);
            }
        }
        Self {
            size,
            cells,
            home,
            away,
        }
    }

    pub fn cell(&self, home_goals: usize, away_goals: usize) -> f64 {
        self.cells[home_goals * self.size + away_goals]
    }

    fn iter(&self) -> impl Iterator<Item = (i32, i32, f64)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, p)| ((idx / self.size) as i32, (idx % self.size) as i32, *p))
    }

    /// Sum of the pmf over scorelines matching `pred`.
    pub fn sum_where(&self, pred: impl Fn(i32, i32) -> bool) -> f64 {
        self.iter()
            .filter(|(h, a, _)| pred(*h, *a))
            .map(|(_, _, p)| p)
            .sum()
    }

    /// Home / draw / away, renormalized against float drift.
    pub fn outcome_probs(&self) -> Prob3 {
        let mut p_home = 0.0;
        let mut p_draw = 0.0;
        let mut p_away = 0.0;
        for (h, a, p) in self.iter() {
            if h > a {
                p_home += p;
            } else if h < a {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
        let sum = p_home + p_draw + p_away;
        if sum > 0.0 {
            Prob3 {
                home: p_home / sum,
                draw: p_draw / sum,
                away: p_away / sum,
            }
        } else {
            Prob3 {
                home: 1.0 / 3.0,
                draw: 1.0 / 3.0,
                away: 1.0 / 3.0,
            }
        }
    }

    /// P(h + a >= min_total).
    pub fn total_at_least(&self, min_total: i32) -> f64 {
        self.sum_where(|h, a| h + a >= min_total).min(1.0)
    }

    /// P(h - a >= min_margin). `min_margin` may be negative.
    pub fn margin_at_least(&self, min_margin: i32) -> f64 {
        self.sum_where(|h, a| h - a >= min_margin).min(1.0)
    }

    /// Both teams score, from the joint grid:
    /// `1 - P(h=0) - P(a=0) + P(h=0, a=0)`.
    pub fn btts_yes(&self) -> f64 {
        let p_h0 = self.home[0];
        let p_a0 = self.away[0];
        (1.0 - p_h0 - p_a0 + self.cell(0, 0)).clamp(0.0, 1.0)
    }

    /// P(side scores at least `min_goals`) from the home or away marginal.
    pub fn team_at_least(&self, home_side: bool, min_goals: i32) -> f64 {
        let pmf = if home_side { &self.home } else { &self.away };
        let start = min_goals.max(0) as usize;
        pmf.iter().skip(start).sum::<f64>().min(1.0)
    }
}
