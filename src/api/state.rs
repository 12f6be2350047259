use std::sync::Arc;

use crate::engine::drop_matrix::DropMatrixService;
use crate::engine::pattern_matrix::PatternMatrixService;
use crate::engine::trend::TrendService;
use crate::repo::{AccountRepo, ItemRepo, StageRepo};

#[derive(Clone)]
pub struct AppState {
    pub stage_repo: Arc<dyn StageRepo>,
    pub item_repo: Arc<dyn ItemRepo>,
    pub account_repo: Arc<dyn AccountRepo>,
    pub drop_matrix: Arc<DropMatrixService>,
    pub trend: Arc<TrendService>,
    pub pattern_matrix: Arc<PatternMatrixService>,
}
