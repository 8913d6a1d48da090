//! Frame-by-frame navigation through a finished match, for viewers.
//!
//! A [`ReplayCursor`] only borrows the [`MatchLog`]: nothing can change the log through it.
//! Frames are drawn by a [`Renderer`], which can be any closure with the right signature:
//!
//! ```
//! # use bot_tournament::{match_log::MatchLog, replay::ReplayCursor};
//! # fn show(log: &MatchLog<u32>) -> std::fmt::Result {
//! use std::fmt::Write;
//!
//! let mut cursor = ReplayCursor::new(log);
//! let mut heap = |snapshot: &u32, out: &mut dyn Write| {
//!     write!(out, "{}", "|".repeat(*snapshot as usize))
//! };
//! loop {
//!     println!("{}", cursor.render_frame(&mut heap)?);
//!     if !cursor.forward() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use crate::match_log::MatchLog;

/// Draws one snapshot as text.
pub trait Renderer<S> {
    fn render(&mut self, snapshot: &S, out: &mut dyn fmt::Write) -> fmt::Result;
}

impl<S, T> Renderer<S> for T
where
    T: FnMut(&S, &mut dyn fmt::Write) -> fmt::Result,
{
    fn render(&mut self, snapshot: &S, out: &mut dyn fmt::Write) -> fmt::Result {
        self(snapshot, out)
    }
}

/// Read-only position in the snapshots of a match log.
#[derive(Debug)]
pub struct ReplayCursor<'a, S> {
    log: &'a MatchLog<S>,
    position: usize,
}

impl<'a, S> ReplayCursor<'a, S> {
    /// A cursor on the first snapshot.
    pub fn new(log: &'a MatchLog<S>) -> ReplayCursor<'a, S> {
        ReplayCursor { log, position: 0 }
    }

    /// Index of the current snapshot.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn is_first(&self) -> bool {
        self.position == 0
    }

    pub fn is_last(&self) -> bool {
        self.position + 1 >= self.log.len()
    }

    pub fn current(&self) -> Option<&'a S> {
        self.log.get(self.position)
    }

    /// Moves to the next snapshot. `false`, without moving, on the last one.
    pub fn forward(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.position += 1;
        true
    }

    /// Moves to the previous snapshot. `false`, without moving, on the first one.
    pub fn back(&mut self) -> bool {
        if self.is_first() {
            return false;
        }
        self.position -= 1;
        true
    }

    /// Moves to snapshot `index`. `false`, without moving, if there is no such snapshot.
    pub fn jump(&mut self, index: usize) -> bool {
        if index >= self.log.len() {
            return false;
        }
        self.position = index;
        true
    }

    /// The current snapshot drawn by `renderer`, under a `Frame #0001 of 12:` header.
    ///
    /// The final scores follow the last frame of a finished match.
    pub fn render_frame(&self, renderer: &mut impl Renderer<S>) -> Result<String, fmt::Error> {
        let mut out = String::new();
        let Some(snapshot) = self.current() else {
            return Ok(out);
        };
        fmt::Write::write_fmt(
            &mut out,
            format_args!("Frame #{:04} of {}:\n", self.position + 1, self.len()),
        )?;
        renderer.render(snapshot, &mut out)?;
        out.push('\n');
        if self.is_last() {
            if let Some(scores) = self.log.scores() {
                for name in self.log.players() {
                    let score = scores.get(name).copied().unwrap_or_default();
                    fmt::Write::write_fmt(&mut out, format_args!("{name}: {score}\n"))?;
                }
            }
        }
        Ok(out)
    }
}
