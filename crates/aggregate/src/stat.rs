//! Streaming reducers and their registration as SQLite aggregates.

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::ToSql;
use rusqlite::Connection;
use std::marker::PhantomData;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// A single-pass reduction over nullable numeric values.
pub trait Reducer: Default {
    type Output: ToSql;

    /// Feed one value; `None` is a SQL NULL.
    fn step(&mut self, value: Option<f64>);

    /// `None` when the reduction is undefined for what was seen.
    fn finalize(self) -> Option<Self::Output>;
}

/// Welford-style running mean and sum of squares.
///
/// The count starts at one, so after `n` values `k = n + 1` and the
/// result is `sqrt(S / (k - 2))`, the sample standard deviation. Fewer
/// than two values give no result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatAccumulator {
    k: u64,
    mean: f64,
    sum_of_squares: f64,
}

impl Default for StatAccumulator {
    fn default() -> Self {
        Self {
            k: 1,
            mean: 0.0,
            sum_of_squares: 0.0,
        }
    }
}

impl StatAccumulator {
    /// Number of non-null values seen.
    pub fn count(&self) -> u64 {
        self.k - 1
    }

    pub fn mean(&self) -> Option<f64> {
        (self.k > 1).then_some(self.mean)
    }
}

impl Reducer for StatAccumulator {
    type Output = f64;

    fn step(&mut self, value: Option<f64>) {
        let Some(v) = value else {
            return;
        };
        let previous = self.mean;
        self.mean += (v - previous) / self.k as f64;
        self.sum_of_squares += (v - previous) * (v - self.mean);
        self.k += 1;
    }

    fn finalize(self) -> Option<f64> {
        if self.k < 3 {
            return None;
        }
        Some((self.sum_of_squares / (self.k - 2) as f64).sqrt())
    }
}

/// Adapts any [`Reducer`] to rusqlite's aggregate interface.
struct SqliteReducer<R>(PhantomData<fn() -> R>);

impl<R> Aggregate<R, Option<R::Output>> for SqliteReducer<R>
where
    R: Reducer + RefUnwindSafe + UnwindSafe,
{
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<R> {
        Ok(R::default())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut R) -> rusqlite::Result<()> {
        acc.step(ctx.get::<Option<f64>>(0)?);
        Ok(())
    }

    fn finalize(&self, _ctx: &mut Context<'_>, acc: Option<R>) -> rusqlite::Result<Option<R::Output>> {
        // `acc` is None when the group had no rows at all
        Ok(acc.unwrap_or_default().finalize())
    }
}

/// Register `R` as the one-argument SQL aggregate `name`.
pub fn register_reducer<R>(conn: &Connection, name: &str) -> rusqlite::Result<()>
where
    R: Reducer + RefUnwindSafe + UnwindSafe + 'static,
{
    conn.create_aggregate_function(
        name,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        SqliteReducer::<R>(PhantomData),
    )
}
