use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 默认的配对数量（一局 6 对 = 12 张卡牌）。
pub const DEFAULT_PAIR_COUNT: u32 = 6;

/// 卡牌的全局唯一标识。同一生物的两张卡牌共享 species，但 id 绝不相同。
pub type CardId = u32;

/// 场上的一张卡牌。species 是配对用的身份键，sprite 是展示图片。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
    #[serde(default)]
    pub revealed: bool,
    #[serde(default)]
    pub matched: bool,
}

impl Card {
    pub fn new(id: CardId, species: impl Into<String>, sprite: Option<String>) -> Self {
        Self {
            id,
            species: species.into(),
            sprite,
            revealed: false,
            matched: false,
        }
    }
}

/// 当前待判定的选择。结构上最多容纳两张卡牌。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Selection {
    #[default]
    Empty,
    One {
        card: CardId,
    },
    Two {
        first: CardId,
        second: CardId,
    },
}

impl Selection {
    pub fn contains(&self, card_id: CardId) -> bool {
        match *self {
            Selection::Empty => false,
            Selection::One { card } => card == card_id,
            Selection::Two { first, second } => first == card_id || second == card_id,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Selection::Two { .. })
    }

    pub fn as_pair(&self) -> Option<(CardId, CardId)> {
        match *self {
            Selection::Two { first, second } => Some((first, second)),
            _ => None,
        }
    }

    pub fn card_ids(&self) -> Vec<CardId> {
        match *self {
            Selection::Empty => Vec::new(),
            Selection::One { card } => vec![card],
            Selection::Two { first, second } => vec![first, second],
        }
    }
}

/// 游戏阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Loading,
    Memorizing,
    Playing,
    Won,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Loading
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub matched_pairs: u32,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameReset {
        epoch: u64,
    },
    DeckReady {
        pair_count: u32,
    },
    LoadFailed {
        message: String,
    },
    MemorizationEnded,
    CardRevealed {
        card_id: CardId,
    },
    PairMatched {
        first: CardId,
        second: CardId,
        species: String,
    },
    PairMismatched {
        first: CardId,
        second: CardId,
    },
    GameWon {
        matched_pairs: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    DuplicateCardId { card_id: CardId },
    DeckSizeMismatch { expected: usize, actual: usize },
    OddSpeciesCount { species: String, count: usize },
    SelectionCardMissing { card_id: CardId },
    SelectionCardUnplayable { card_id: CardId },
    MatchedPairsMismatch { matched_pairs: u32, matched_cards: usize },
    WonWithoutAllPairs { matched_pairs: u32, pair_count: u32 },
}

/// 渲染模型中的一张卡牌。未翻开的卡牌不暴露身份与图片。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardView {
    pub card_id: CardId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub revealed: bool,
    pub matched: bool,
}

/// 提供给外部视图的完整渲染模型。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderModel {
    pub phase: GamePhase,
    pub cards: Vec<CardView>,
    pub matched_pairs: u32,
    pub pair_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 游戏整体状态。只允许通过 `game::rules` 的转移函数修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub matched_pairs: u32,
    #[serde(default = "default_pair_count")]
    pub pair_count: u32,
    pub phase: GamePhase,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

fn default_pair_count() -> u32 {
    DEFAULT_PAIR_COUNT
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == card_id)
    }

    pub fn card_mut(&mut self, card_id: CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|card| card.id == card_id)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Won
    }

    pub fn all_pairs_matched(&self) -> bool {
        self.matched_pairs == self.pair_count
    }

    pub fn victory(&self) -> Option<VictoryState> {
        self.is_finished().then(|| VictoryState {
            matched_pairs: self.matched_pairs,
        })
    }

    pub fn render_model(&self) -> RenderModel {
        let cards = self
            .cards
            .iter()
            .map(|card| {
                let face_up = card.revealed || card.matched;
                CardView {
                    card_id: card.id,
                    species: face_up.then(|| card.species.clone()),
                    image: if face_up { card.sprite.clone() } else { None },
                    revealed: card.revealed,
                    matched: card.matched,
                }
            })
            .collect();

        RenderModel {
            phase: self.phase,
            cards,
            matched_pairs: self.matched_pairs,
            pair_count: self.pair_count,
            error: self.load_error.clone(),
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        for card in &self.cards {
            if !seen.insert(card.id) {
                return Err(IntegrityError::DuplicateCardId { card_id: card.id });
            }
        }

        if self.phase != GamePhase::Loading {
            let expected = (self.pair_count as usize) * 2;
            if self.cards.len() != expected {
                return Err(IntegrityError::DeckSizeMismatch {
                    expected,
                    actual: self.cards.len(),
                });
            }
        }

        // 随机抽取允许重复生物，因此只要求每个 species 的张数为偶数。
        let mut species_counts: HashMap<&str, usize> = HashMap::new();
        for card in &self.cards {
            *species_counts.entry(card.species.as_str()).or_default() += 1;
        }
        for (species, count) in species_counts {
            if count % 2 != 0 {
                return Err(IntegrityError::OddSpeciesCount {
                    species: species.to_string(),
                    count,
                });
            }
        }

        for card_id in self.selection.card_ids() {
            let card = self
                .card(card_id)
                .ok_or(IntegrityError::SelectionCardMissing { card_id })?;
            if card.matched || !card.revealed {
                return Err(IntegrityError::SelectionCardUnplayable { card_id });
            }
        }
        if let Some((first, second)) = self.selection.as_pair() {
            if first == second {
                return Err(IntegrityError::SelectionCardUnplayable { card_id: first });
            }
        }

        let matched_cards = self.cards.iter().filter(|card| card.matched).count();
        if matched_cards != (self.matched_pairs as usize) * 2 {
            return Err(IntegrityError::MatchedPairsMismatch {
                matched_pairs: self.matched_pairs,
                matched_cards,
            });
        }

        if self.phase == GamePhase::Won && !self.all_pairs_matched() {
            return Err(IntegrityError::WonWithoutAllPairs {
                matched_pairs: self.matched_pairs,
                pair_count: self.pair_count,
            });
        }

        Ok(())
    }

    pub fn sample() -> Self {
        const SPECIES: [(&str, u32); 6] = [
            ("bulbasaur", 1),
            ("charmander", 4),
            ("squirtle", 7),
            ("pikachu", 25),
            ("eevee", 133),
            ("jigglypuff", 39),
        ];

        fn sprite_url(id: u32) -> Option<String> {
            Some(format!(
                "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/{id}.png"
            ))
        }

        // 固定的交错排列，便于前端联调时得到可复现的局面。
        const LAYOUT: [usize; 12] = [3, 0, 4, 1, 5, 2, 0, 4, 1, 5, 2, 3];

        let mut cards = Vec::with_capacity(LAYOUT.len());
        for (card_id, &slot) in LAYOUT.iter().enumerate() {
            let (name, species_id) = SPECIES[slot];
            cards.push(Card::new(card_id as CardId, name, sprite_url(species_id)));
        }

        let mut state = GameState {
            cards,
            selection: Selection::Empty,
            matched_pairs: 0,
            pair_count: DEFAULT_PAIR_COUNT,
            phase: GamePhase::Playing,
            epoch: 1,
            load_error: None,
            event_log: Vec::new(),
        };
        state.record_event(GameEvent::GameReset { epoch: 1 });
        state.record_event(GameEvent::DeckReady {
            pair_count: DEFAULT_PAIR_COUNT,
        });
        state.record_event(GameEvent::MemorizationEnded);

        // 预先配好一对 eevee，展示 matched 卡牌的渲染路径。
        let (first, second) = (2, 7);
        for card_id in [first, second] {
            if let Some(card) = state.card_mut(card_id) {
                card.revealed = true;
                card.matched = true;
            }
        }
        state.matched_pairs = 1;
        state.record_event(GameEvent::PairMatched {
            first,
            second,
            species: "eevee".to_string(),
        });

        state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            cards: Vec::new(),
            selection: Selection::Empty,
            matched_pairs: 0,
            pair_count: DEFAULT_PAIR_COUNT,
            phase: GamePhase::default(),
            epoch: 0,
            load_error: None,
            event_log: Vec::new(),
        }
    }
}
