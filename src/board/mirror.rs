use std::collections::HashMap;

use chrono::Utc;

use dealboard_common::{DEFAULT_PROBABILITY, Deal, Pipeline, Stage, UNKNOWN_PIPELINE, UNKNOWN_STAGE};

use crate::errors::BoardError;

/// Id-keyed collection that remembers insertion order.
///
/// Re-inserting an existing id replaces the value in its original position.
#[derive(Debug, Clone)]
struct Keyed<T> {
    index: HashMap<String, usize>,
    items: Vec<T>,
}

impl<T> Default for Keyed<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<T> Keyed<T> {
    fn from_items(items: Vec<T>, key: impl Fn(&T) -> &str) -> Self {
        let mut keyed = Self::default();
        for item in items {
            keyed.upsert(item, &key);
        }
        keyed
    }

    fn upsert(&mut self, item: T, key: impl Fn(&T) -> &str) {
        let id = key(&item).to_string();
        match self.index.get(&id) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.index.insert(id, self.items.len());
                self.items.push(item);
            }
        }
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        match self.index.get(id) {
            Some(&pos) => self.items.get_mut(pos),
            None => None,
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Local mirror of the remote deal, pipeline and stage collections.
///
/// Each collection is replaced wholesale on fetch; nothing is merged. Lookups
/// are synchronous and return `None` for unknown ids.
#[derive(Debug, Clone, Default)]
pub struct MirrorStore {
    deals: Keyed<Deal>,
    pipelines: Keyed<Pipeline>,
    stages: Keyed<Stage>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_deals(&mut self, deals: Vec<Deal>) {
        self.deals = Keyed::from_items(deals, |d| &d.id);
    }

    pub fn replace_pipelines(&mut self, pipelines: Vec<Pipeline>) {
        self.pipelines = Keyed::from_items(pipelines, |p| &p.id);
    }

    pub fn replace_stages(&mut self, stages: Vec<Stage>) {
        self.stages = Keyed::from_items(stages, |s| &s.id);
    }

    /// Insert a new deal, or replace one with the same id in place.
    pub fn insert_deal(&mut self, deal: Deal) {
        self.deals.upsert(deal, |d| &d.id);
    }

    /// Drop every snapshot (logout / shutdown).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn get_deal(&self, id: &str) -> Option<&Deal> {
        self.deals.get(id)
    }

    /// Deals in the order the remote service returned them.
    pub fn list_deals(&self) -> &[Deal] {
        &self.deals.items
    }

    pub fn deal_count(&self) -> usize {
        self.deals.len()
    }

    pub fn get_stage(&self, id: &str) -> Option<&Stage> {
        self.stages.get(id)
    }

    /// All stages, stable-sorted by display order.
    pub fn list_stages(&self) -> Vec<&Stage> {
        let mut stages: Vec<&Stage> = self.stages.items.iter().collect();
        stages.sort_by_key(|s| s.display_order);
        stages
    }

    /// Stages of one pipeline, stable-sorted by display order.
    pub fn list_stages_for_pipeline(&self, pipeline_id: &str) -> Vec<&Stage> {
        let mut stages: Vec<&Stage> = self
            .stages
            .items
            .iter()
            .filter(|s| s.pipeline_id == pipeline_id)
            .collect();
        stages.sort_by_key(|s| s.display_order);
        stages
    }

    pub fn get_pipeline(&self, id: &str) -> Option<&Pipeline> {
        self.pipelines.get(id)
    }

    /// Pipelines, stable-sorted by display order.
    pub fn list_pipelines(&self) -> Vec<&Pipeline> {
        let mut pipelines: Vec<&Pipeline> = self.pipelines.items.iter().collect();
        pipelines.sort_by_key(|p| p.display_order);
        pipelines
    }

    /// Move a deal to `new_stage_id` in the mirror.
    ///
    /// Stage name and probability are taken from the target stage and the
    /// timestamp is refreshed. If the stage lives in another pipeline the
    /// pipeline reference follows it.
    pub fn apply_stage_reassignment(
        &mut self,
        deal_id: &str,
        new_stage_id: &str,
    ) -> Result<Deal, BoardError> {
        let stage = self
            .stages
            .get(new_stage_id)
            .cloned()
            .ok_or_else(|| BoardError::stage_not_found(new_stage_id))?;
        let pipeline_name = self.pipelines.get(&stage.pipeline_id).map(|p| p.name.clone());
        let deal = self
            .deals
            .get_mut(deal_id)
            .ok_or_else(|| BoardError::deal_not_found(deal_id))?;

        deal.stage_id = stage.id;
        deal.stage_name = stage.label;
        deal.probability = stage.probability;
        if deal.pipeline_id != stage.pipeline_id {
            deal.pipeline_id = stage.pipeline_id;
            deal.pipeline_name = pipeline_name.unwrap_or_else(|| UNKNOWN_PIPELINE.to_string());
        }
        deal.last_updated = Some(Utc::now());
        Ok(deal.clone())
    }

    /// Fill every deal's stage name, pipeline name and probability from the
    /// current stage and pipeline snapshots.
    pub fn denormalize_deals(&mut self) {
        let stages = &self.stages;
        let pipelines = &self.pipelines;
        for deal in &mut self.deals.items {
            denormalize(deal, stages, pipelines);
        }
    }
}

fn denormalize(deal: &mut Deal, stages: &Keyed<Stage>, pipelines: &Keyed<Pipeline>) {
    match stages.get(&deal.stage_id) {
        Some(stage) => {
            deal.stage_name = stage.label.clone();
            deal.probability = stage.probability.clone();
        }
        None => {
            deal.stage_name = UNKNOWN_STAGE.to_string();
            deal.probability = DEFAULT_PROBABILITY.to_string();
        }
    }
    deal.pipeline_name = pipelines
        .get(&deal.pipeline_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| UNKNOWN_PIPELINE.to_string());
}
