//! Per-run parsing state and the rows snapshotted from it

use crate::table::{Cell, Variant};

/// Fields carried across log lines for the run currently being parsed.
///
/// Every field keeps its value until a line with the same label overwrites it, apart from the
/// counters cleared when a new algorithm section starts (see [`RunContext::start_kdtree`] and
/// [`RunContext::start_oddson_tree`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    pub dim: i64,
    pub pts: i64,
    pub sigma: f64,
    pub search: i64,
    pub sample: i64,
    pub run: i64,
    pub k: i64,
    pub build_depth: i64,
    pub kdtree: bool,
    pub ctime: f64,
    pub qtime: f64,
    pub hits: i64,
    pub backup: i64,
    pub total: i64,
    pub terminal: i64,
    pub build_nn_queries: i64,
}

/// Immutable copy of a [`RunContext`] taken at a `done:` line.
///
/// `k` is kept for callers but is not part of the column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub dim: i64,
    pub pts: i64,
    pub sigma: f64,
    pub search: i64,
    pub sample: i64,
    pub build_depth: i64,
    pub run: i64,
    pub k: i64,
    pub kdtree: bool,
    pub ctime: f64,
    pub qtime: f64,
    pub hits: i64,
    pub backup: i64,
    pub total: i64,
    pub terminal: i64,
    pub build_nn_queries: i64,
}

impl RunContext {
    pub fn snapshot(&self) -> ObservationRow {
        return ObservationRow {
            dim: self.dim,
            pts: self.pts,
            sigma: self.sigma,
            search: self.search,
            sample: self.sample,
            build_depth: self.build_depth,
            run: self.run,
            k: self.k,
            kdtree: self.kdtree,
            ctime: self.ctime,
            qtime: self.qtime,
            hits: self.hits,
            backup: self.backup,
            total: self.total,
            terminal: self.terminal,
            build_nn_queries: self.build_nn_queries,
        };
    }

    /// Handles a `running kdtree` marker.
    ///
    /// In the extended variant the build depth is cleared as well, since a kd-tree run has no
    /// build depth of its own.
    pub fn start_kdtree(&mut self, variant: Variant) {
        self.kdtree = true;
        self.clear_counters(variant);

        if variant.is_extended() {
            self.build_depth = 0;
        }
    }

    /// Handles a `running odds-on tree` marker. The build depth line precedes this marker in
    /// the log, so it is left alone.
    pub fn start_oddson_tree(&mut self, variant: Variant) {
        self.kdtree = false;
        self.clear_counters(variant);
    }

    fn clear_counters(&mut self, variant: Variant) {
        self.hits = 0;
        self.backup = 0;

        if variant.is_extended() {
            self.total = 0;
            self.terminal = 0;
            self.build_nn_queries = 0;
        }
    }
}

impl ObservationRow {
    /// Cells in schema column order for `variant`.
    pub fn values(&self, variant: Variant) -> Vec<Cell> {
        let mut values = vec![
            Cell::Int(self.dim),
            Cell::Int(self.pts),
            Cell::Real(self.sigma),
            Cell::Int(self.search),
            Cell::Int(self.sample),
            Cell::Int(self.build_depth),
            Cell::Int(self.run),
            Cell::Bool(self.kdtree),
            Cell::Real(self.ctime),
            Cell::Real(self.qtime),
            Cell::Int(self.hits),
            Cell::Int(self.backup),
        ];

        if variant.is_extended() {
            values.push(Cell::Int(self.total));
            values.push(Cell::Int(self.terminal));
            values.push(Cell::Int(self.build_nn_queries));
        }

        return values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured_context() -> RunContext {
        let mut ctx = RunContext::default();
        ctx.build_depth = 6;
        ctx.hits = 10;
        ctx.backup = 4;
        ctx.total = 100;
        ctx.terminal = 40;
        ctx.build_nn_queries = 7;
        ctx.ctime = 1.5;
        return ctx;
    }

    #[test]
    fn standard_markers_clear_hits_and_backup_only() {
        let mut ctx = measured_context();
        ctx.start_kdtree(Variant::Standard);

        assert!(ctx.kdtree);
        assert_eq!(ctx.hits, 0);
        assert_eq!(ctx.backup, 0);
        assert_eq!(ctx.build_depth, 6);
        assert_eq!(ctx.total, 100);
        assert_eq!(ctx.ctime, 1.5);
    }

    #[test]
    fn extended_kdtree_marker_clears_build_depth() {
        let mut ctx = measured_context();
        ctx.start_kdtree(Variant::Extended);

        assert_eq!(ctx.build_depth, 0);
        assert_eq!(ctx.total, 0);
        assert_eq!(ctx.terminal, 0);
        assert_eq!(ctx.build_nn_queries, 0);
    }

    #[test]
    fn extended_oddson_marker_keeps_build_depth() {
        let mut ctx = measured_context();
        ctx.kdtree = true;
        ctx.start_oddson_tree(Variant::Extended);

        assert!(!ctx.kdtree);
        assert_eq!(ctx.build_depth, 6);
        assert_eq!(ctx.hits, 0);
        assert_eq!(ctx.total, 0);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ctx = measured_context();
        let row = ctx.snapshot();
        ctx.hits = 99;

        assert_eq!(row.hits, 10);
        assert_eq!(row.values(Variant::Standard).len(), 12);
        assert_eq!(row.values(Variant::Extended)[14], Cell::Int(7));
    }
}
