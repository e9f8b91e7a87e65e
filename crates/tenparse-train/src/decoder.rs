//! First-order decoding
//!
//! [`EisnerDecoder`] finds the highest-scoring projective tree rooted at token
//! 0 with the chart algorithm of Eisner (1996). Items are keyed by
//! `(head, end)`: `end > head` spans to the right of the head, `end < head` to
//! the left. Incomplete items still expect their modifier's inner side;
//! complete items are finished subtrees.

use anyhow::{ensure, Result};

/// Scores of every arc `head → modifier` of one sentence
#[derive(Debug, Clone, PartialEq)]
pub struct ArcScores {
    n: usize,
    scores: Vec<f64>,
}

impl ArcScores {
    /// `n` tokens (root included), every arc at negative infinity
    pub fn new(n: usize) -> Self {
        Self {
            n,
            scores: vec![f64::NEG_INFINITY; n * n],
        }
    }

    /// Build from a score function over every arc with `head != modifier`
    /// and a non-root modifier
    pub fn from_fn<F>(n: usize, mut score: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> Result<f64>,
    {
        let mut scores = Self::new(n);
        for h in 0..n {
            for m in 1..n {
                if h != m {
                    scores.set(h, m, score(h, m)?);
                }
            }
        }
        Ok(scores)
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n <= 1
    }

    #[inline]
    pub fn get(&self, head: usize, modifier: usize) -> f64 {
        self.scores[head * self.n + modifier]
    }

    #[inline]
    pub fn set(&mut self, head: usize, modifier: usize, score: f64) {
        self.scores[head * self.n + modifier] = score;
    }

    /// Sum of arc scores of `heads`, `-1` entries skipped
    pub fn tree_score(&self, heads: &[i32]) -> f64 {
        heads
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(m, &h)| usize::try_from(h).ok().map(|h| self.get(h, m)))
            .sum()
    }
}

/// Predicts a head for every token from arc scores
pub trait DependencyDecoder {
    /// Heads of the best tree, `-1` for the root.
    ///
    /// With `loss_gold`, every arc whose head differs from the gold head gets
    /// `+1` before decoding.
    fn decode(&self, scores: &ArcScores, loss_gold: Option<&[i32]>) -> Result<Vec<i32>>;
}

/// Projective first-order decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct EisnerDecoder;

#[derive(Debug, Clone, Copy)]
enum Item {
    Complete(usize, usize),
    Incomplete(usize, usize),
}

struct Chart {
    n: usize,
    complete: Vec<f64>,
    complete_split: Vec<usize>,
    incomplete: Vec<f64>,
    incomplete_split: Vec<usize>,
}

impl Chart {
    fn new(n: usize) -> Self {
        let mut complete = vec![f64::NEG_INFINITY; n * n];
        for i in 0..n {
            complete[i * n + i] = 0.0;
        }
        Self {
            n,
            complete,
            complete_split: vec![0; n * n],
            incomplete: vec![f64::NEG_INFINITY; n * n],
            incomplete_split: vec![0; n * n],
        }
    }

    #[inline]
    fn c(&self, head: usize, end: usize) -> f64 {
        self.complete[head * self.n + end]
    }

    #[inline]
    fn i(&self, head: usize, end: usize) -> f64 {
        self.incomplete[head * self.n + end]
    }

    fn offer_complete(&mut self, head: usize, end: usize, split: usize, score: f64) {
        let k = head * self.n + end;
        if score > self.complete[k] {
            self.complete[k] = score;
            self.complete_split[k] = split;
        }
    }

    fn offer_incomplete(&mut self, head: usize, end: usize, split: usize, score: f64) {
        let k = head * self.n + end;
        if score > self.incomplete[k] {
            self.incomplete[k] = score;
            self.incomplete_split[k] = split;
        }
    }
}

impl DependencyDecoder for EisnerDecoder {
    fn decode(&self, scores: &ArcScores, loss_gold: Option<&[i32]>) -> Result<Vec<i32>> {
        let n = scores.len();
        if let Some(gold) = loss_gold {
            ensure!(gold.len() == n, "{} gold heads for a {}-token sentence", gold.len(), n);
        }
        if n <= 1 {
            return Ok(vec![-1; n]);
        }
        let arc = |h: usize, m: usize| {
            let loss = match loss_gold {
                Some(gold) if gold[m] != h as i32 => 1.0,
                _ => 0.0,
            };
            scores.get(h, m) + loss
        };

        let mut chart = Chart::new(n);
        for width in 1..n {
            for s in 0..n - width {
                let t = s + width;
                let (st, ts) = (arc(s, t), arc(t, s));
                for r in s..t {
                    let base = chart.c(s, r) + chart.c(t, r + 1);
                    chart.offer_incomplete(s, t, r, base + st);
                    // the root never becomes a modifier
                    if s != 0 {
                        chart.offer_incomplete(t, s, r, base + ts);
                    }
                }
                for r in s..=t {
                    if r != s {
                        let score = chart.i(s, r) + chart.c(r, t);
                        chart.offer_complete(s, t, r, score);
                    }
                    if r != t {
                        let score = chart.c(r, s) + chart.i(t, r);
                        chart.offer_complete(t, s, r, score);
                    }
                }
            }
        }
        ensure!(
            chart.c(0, n - 1) > f64::NEG_INFINITY,
            "no projective tree has a finite score"
        );

        let mut heads = vec![-1; n];
        let mut stack = vec![Item::Complete(0, n - 1)];
        while let Some(item) = stack.pop() {
            match item {
                Item::Complete(h, e) if h == e => {}
                Item::Complete(h, e) => {
                    let r = chart.complete_split[h * n + e];
                    if h < e {
                        stack.push(Item::Incomplete(h, r));
                        stack.push(Item::Complete(r, e));
                    } else {
                        stack.push(Item::Complete(r, e));
                        stack.push(Item::Incomplete(h, r));
                    }
                }
                Item::Incomplete(h, e) => {
                    heads[e] = h as i32;
                    let r = chart.incomplete_split[h * n + e];
                    let (s, t) = (h.min(e), h.max(e));
                    stack.push(Item::Complete(s, r));
                    stack.push(Item::Complete(t, r + 1));
                }
            }
        }
        Ok(heads)
    }
}
