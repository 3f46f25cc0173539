//! Stage-grouped view of the mirror.
//!
//! A projection is one column per stage in scope, each holding the deals
//! that pass the active filters. It is derived data: recomputing it from the
//! mirror is always safe, and the controller does so after every fetch and
//! filter change. Between recomputes the controller edits columns directly
//! to show optimistic moves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use dealboard_common::{Deal, Stage};

use super::mirror::MirrorStore;

/// Active board filters. An empty search and no pipeline show everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardFilters {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub pipeline_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageColumn {
    pub stage_id: String,
    pub label: String,
    pub probability: String,
    pub is_closed: bool,
    pub deals: Vec<Deal>,
}

impl StageColumn {
    fn empty(stage: &Stage) -> Self {
        Self {
            stage_id: stage.id.clone(),
            label: stage.label.clone(),
            probability: stage.probability.clone(),
            is_closed: stage.is_closed,
            deals: Vec::new(),
        }
    }

    /// Sum of known deal amounts in this column.
    pub fn total_amount(&self) -> i64 {
        self.deals.iter().filter_map(|d| d.amount).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardProjection {
    pub columns: Vec<StageColumn>,
}

impl BoardProjection {
    pub fn column(&self, stage_id: &str) -> Option<&StageColumn> {
        self.columns.iter().find(|c| c.stage_id == stage_id)
    }

    fn column_mut(&mut self, stage_id: &str) -> Option<&mut StageColumn> {
        self.columns.iter_mut().find(|c| c.stage_id == stage_id)
    }

    /// `(column, position)` of a deal, if it is projected anywhere.
    pub fn locate(&self, deal_id: &str) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, column)| {
            column
                .deals
                .iter()
                .position(|d| d.id == deal_id)
                .map(|pos| (ci, pos))
        })
    }

    pub fn deal_count(&self) -> usize {
        self.columns.iter().map(|c| c.deals.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Owns the filters, the explicit per-stage ordering and the current
/// projection.
#[derive(Debug, Default)]
pub struct Projector {
    filters: BoardFilters,
    explicit_order: HashMap<String, Vec<String>>,
    projection: BoardProjection,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &BoardFilters {
        &self.filters
    }

    pub fn set_search_text(&mut self, text: &str) {
        self.filters.search = text.to_string();
    }

    pub fn set_selected_pipeline(&mut self, pipeline_id: Option<String>) {
        self.filters.pipeline_id = pipeline_id.filter(|id| !id.is_empty());
    }

    pub fn projection(&self) -> &BoardProjection {
        &self.projection
    }

    /// Stages shown as columns: the selected pipeline's, or every known
    /// stage when no pipeline is selected.
    pub fn scoped_stages<'m>(&self, mirror: &'m MirrorStore) -> Vec<&'m Stage> {
        match &self.filters.pipeline_id {
            Some(pipeline_id) => mirror.list_stages_for_pipeline(pipeline_id),
            None => mirror.list_stages(),
        }
    }

    /// Rebuild the projection from the mirror.
    ///
    /// Every deal passing the filters lands in exactly one column. A deal
    /// whose stage is not in scope goes to the first column.
    pub fn project(&mut self, mirror: &MirrorStore) -> &BoardProjection {
        let stages = self.scoped_stages(mirror);
        let mut columns: Vec<StageColumn> = stages.iter().map(|s| StageColumn::empty(s)).collect();

        if !columns.is_empty() {
            let slots: HashMap<&str, usize> = stages
                .iter()
                .enumerate()
                .map(|(i, s)| (s.id.as_str(), i))
                .collect();
            let needle = self.filters.search.trim().to_lowercase();

            for deal in mirror.list_deals() {
                if !self.passes_filters(deal, &needle) {
                    continue;
                }
                let slot = slots.get(deal.stage_id.as_str()).copied().unwrap_or(0);
                columns[slot].deals.push(deal.clone());
            }

            for column in &mut columns {
                if let Some(order) = self.explicit_order.get(&column.stage_id) {
                    apply_explicit_order(&mut column.deals, order);
                }
            }
        }

        self.projection = BoardProjection { columns };
        &self.projection
    }

    fn passes_filters(&self, deal: &Deal, needle: &str) -> bool {
        if let Some(pipeline_id) = &self.filters.pipeline_id {
            if &deal.pipeline_id != pipeline_id {
                return false;
            }
        }
        needle.is_empty() || matches_search(deal, needle)
    }

    /// Pin the current order of a column so recomputes keep it.
    pub fn record_order(&mut self, stage_id: &str) {
        if let Some(column) = self.projection.column(stage_id) {
            let ids = column.deals.iter().map(|d| d.id.clone()).collect();
            self.explicit_order.insert(stage_id.to_string(), ids);
        }
    }

    pub fn clear_order(&mut self) {
        self.explicit_order.clear();
    }

    /// Remove a deal from its projected column.
    ///
    /// Looks in `preferred_stage` first and falls back to whichever column
    /// holds the deal. `None` when the deal is not projected.
    pub fn take_deal(&mut self, deal_id: &str, preferred_stage: &str) -> Option<Deal> {
        if let Some(column) = self.projection.column_mut(preferred_stage) {
            if let Some(pos) = column.deals.iter().position(|d| d.id == deal_id) {
                return Some(column.deals.remove(pos));
            }
        }
        let (ci, pos) = self.projection.locate(deal_id)?;
        Some(self.projection.columns[ci].deals.remove(pos))
    }

    /// Insert a deal into a column at `index` (clamped), or at the end.
    /// Returns `false` when the stage has no column.
    pub fn place_deal(&mut self, stage_id: &str, deal: Deal, index: Option<usize>) -> bool {
        match self.projection.column_mut(stage_id) {
            Some(column) => {
                let at = index.unwrap_or(column.deals.len()).min(column.deals.len());
                column.deals.insert(at, deal);
                true
            }
            None => false,
        }
    }

    /// Reset filters, ordering and projection.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Case-insensitive substring match on name, company and contact.
/// `needle` must already be lowercase.
pub fn matches_search(deal: &Deal, needle: &str) -> bool {
    let hit = |field: &str| field.to_lowercase().contains(needle);
    hit(&deal.name)
        || deal.company.as_deref().is_some_and(hit)
        || deal.contact.as_deref().is_some_and(hit)
}

/// Explicitly ordered deals first, in recorded order; the rest keep source
/// order after them.
fn apply_explicit_order(deals: &mut [Deal], order: &[String]) {
    let rank: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    deals.sort_by_key(|d| rank.get(d.id.as_str()).copied().unwrap_or(usize::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::testing::{deal, pipeline, stage};

    fn mirror() -> MirrorStore {
        let mut mirror = MirrorStore::new();
        mirror.replace_pipelines(vec![pipeline("p1", "Sales", 0), pipeline("p2", "Renewals", 1)]);
        mirror.replace_stages(vec![
            stage("s1", "p1", "New", 0, "0.2"),
            stage("s2", "p1", "Qualified", 1, "0.6"),
            stage("r1", "p2", "Due", 0, "0.5"),
        ]);
        let mut acme = deal("d1", "Acme platform", "s1", "p1");
        acme.company = Some("Acme Corp".into());
        let mut globex = deal("d2", "Expansion", "s2", "p1");
        globex.contact = Some("Hank ACMEson".into());
        let initech = deal("d3", "Initech", "s1", "p1");
        let renewal = deal("d4", "Umbrella renewal", "r1", "p2");
        mirror.replace_deals(vec![acme, globex, initech, renewal]);
        mirror.denormalize_deals();
        mirror
    }

    fn ids(projection: &BoardProjection, stage_id: &str) -> Vec<String> {
        projection
            .column(stage_id)
            .map(|c| c.deals.iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_every_deal_in_exactly_one_column() {
        let mut mirror = mirror();
        mirror.insert_deal(deal("orphan", "Lost", "gone", "p1"));
        let mut projector = Projector::new();
        projector.set_selected_pipeline(Some("p1".into()));
        let projection = projector.project(&mirror).clone();

        for d in mirror.list_deals().iter().filter(|d| d.pipeline_id == "p1") {
            let hits = projection
                .columns
                .iter()
                .filter(|c| c.deals.iter().any(|x| x.id == d.id))
                .count();
            assert_eq!(hits, 1, "deal {} projected {} times", d.id, hits);
        }
    }

    #[test]
    fn test_unknown_stage_goes_to_first_column() {
        let mut mirror = mirror();
        mirror.insert_deal(deal("orphan", "Lost", "gone", "p1"));
        let mut projector = Projector::new();
        projector.set_selected_pipeline(Some("p1".into()));
        let projection = projector.project(&mirror);
        assert_eq!(ids(projection, "s1"), vec!["d1", "d3", "orphan"]);
    }

    #[test]
    fn test_empty_columns_still_rendered() {
        let mut mirror = mirror();
        mirror.replace_deals(Vec::new());
        let mut projector = Projector::new();
        let projection = projector.project(&mirror);
        assert_eq!(projection.columns.len(), 3);
        assert_eq!(projection.deal_count(), 0);
    }

    #[test]
    fn test_no_stages_yields_empty_projection() {
        let mut mirror = MirrorStore::new();
        mirror.replace_deals(vec![deal("d1", "Acme", "s1", "p1")]);
        let mut projector = Projector::new();
        assert!(projector.project(&mirror).is_empty());
    }

    #[test]
    fn test_no_pipeline_selected_uses_all_stages_sorted() {
        let mut projector = Projector::new();
        let projection = projector.project(&mirror());
        let stage_ids: Vec<&str> = projection.columns.iter().map(|c| c.stage_id.as_str()).collect();
        // s1 and r1 tie on order 0 and keep input order.
        assert_eq!(stage_ids, vec!["s1", "r1", "s2"]);
        assert_eq!(projection.deal_count(), 4);
    }

    #[test]
    fn test_pipeline_filter_excludes_other_pipelines() {
        let mut projector = Projector::new();
        projector.set_selected_pipeline(Some("p1".into()));
        let projection = projector.project(&mirror());
        assert!(projection.column("r1").is_none());
        assert!(projection.locate("d4").is_none());
        assert_eq!(projection.deal_count(), 3);
    }

    #[test]
    fn test_search_filter_and_restore() {
        let mirror = mirror();
        let mut projector = Projector::new();
        projector.set_selected_pipeline(Some("p1".into()));

        projector.set_search_text("acme");
        let projection = projector.project(&mirror);
        // Name, company and contact all count.
        assert_eq!(ids(projection, "s1"), vec!["d1"]);
        assert_eq!(ids(projection, "s2"), vec!["d2"]);

        projector.set_search_text("");
        let projection = projector.project(&mirror);
        assert_eq!(projection.deal_count(), 3);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let d = deal("d1", "Big ACME Deal", "s1", "p1");
        assert!(matches_search(&d, "acme"));
        assert!(!matches_search(&d, "globex"));
    }

    #[test]
    fn test_explicit_order_survives_recompute() {
        let mirror = mirror();
        let mut projector = Projector::new();
        projector.project(&mirror);

        let moved = projector.take_deal("d3", "s1").unwrap();
        assert!(projector.place_deal("s1", moved, Some(0)));
        projector.record_order("s1");
        assert_eq!(ids(projector.projection(), "s1"), vec!["d3", "d1"]);

        projector.project(&mirror);
        assert_eq!(ids(projector.projection(), "s1"), vec!["d3", "d1"]);

        projector.clear_order();
        projector.project(&mirror);
        assert_eq!(ids(projector.projection(), "s1"), vec!["d1", "d3"]);
    }

    #[test]
    fn test_unordered_deals_follow_explicit_ones() {
        let mut deals = vec![
            deal("a", "A", "s1", "p1"),
            deal("b", "B", "s1", "p1"),
            deal("c", "C", "s1", "p1"),
        ];
        apply_explicit_order(&mut deals, &["c".to_string()]);
        let order: Vec<&str> = deals.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_take_deal_falls_back_to_holding_column() {
        let mut projector = Projector::new();
        projector.project(&mirror());
        let taken = projector.take_deal("d2", "s1").unwrap();
        assert_eq!(taken.id, "d2");
        assert!(projector.projection().locate("d2").is_none());
        assert!(projector.take_deal("nope", "s1").is_none());
    }

    #[test]
    fn test_place_deal_clamps_index() {
        let mut projector = Projector::new();
        projector.project(&mirror());
        assert!(projector.place_deal("s2", deal("x", "X", "s2", "p1"), Some(99)));
        assert_eq!(ids(projector.projection(), "s2"), vec!["d2", "x"]);
        assert!(!projector.place_deal("missing", deal("y", "Y", "s2", "p1"), None));
    }

    #[test]
    fn test_column_total_amount() {
        let mut mirror = mirror();
        let mut big = deal("d9", "Big", "s2", "p1");
        big.amount = Some(500);
        let mut small = deal("d8", "Small", "s2", "p1");
        small.amount = Some(250);
        mirror.replace_deals(vec![big, small, deal("d7", "Unknown", "s2", "p1")]);
        let mut projector = Projector::new();
        let projection = projector.project(&mirror);
        assert_eq!(projection.column("s2").unwrap().total_amount(), 750);
    }
}
