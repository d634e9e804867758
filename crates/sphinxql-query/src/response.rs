//! Ordered results of one executed batch or pool launch.

use std::collections::VecDeque;

use sphinxql_core::{Connector, Result, ResultSet};

use crate::batch::QueryBatch;

/// Queue of results in statement submission order.
///
/// Each statement contributes exactly one [`ResultSet`]; a requested
/// `SHOW META` result is attached to it instead of appearing on its own.
#[derive(Debug, Default)]
pub struct Response {
    results: VecDeque<ResultSet>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull one result per queued statement of an answered `batch`,
    /// merging meta results into their owners.
    pub fn fill<C: Connector>(&mut self, batch: &mut QueryBatch<C>) -> Result<()> {
        let wants_meta: Vec<bool> = batch.statements().iter().map(|s| s.wants_meta()).collect();
        for meta in wants_meta {
            let mut result = batch.next_result()?;
            if meta {
                result.attach_meta(Some(batch.next_result()?))?;
            }
            self.results.push_back(result);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Iterator for Response {
    type Item = ResultSet;

    /// Remove and return the oldest result; `None` once drained.
    fn next(&mut self) -> Option<ResultSet> {
        self.results.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.results.len(), Some(self.results.len()))
    }
}

impl ExactSizeIterator for Response {}
