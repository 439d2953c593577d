//! 记忆翻牌游戏核心模块（状态机、翻牌规则、牌组构建）。

pub mod deck;
pub mod rules;
pub mod state;

pub use deck::{assemble_deck, build_deck, draw_species_ids, CATALOG_SIZE};
pub use rules::{
    finish_memorization,
    flip_card,
    load_deck,
    mark_load_failed,
    reset,
    resolve_selection,
    RuleError,
    RuleResolution,
};
pub use state::{
    Card,
    CardId,
    CardView,
    GameEvent,
    GamePhase,
    GameState,
    IntegrityError,
    RenderModel,
    Selection,
    VictoryState,
    DEFAULT_PAIR_COUNT,
};
