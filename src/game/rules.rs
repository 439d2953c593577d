use serde::{Deserialize, Serialize};

use super::state::{
    Card, CardId, GameEvent, GamePhase, GameState, IntegrityError, Selection, VictoryState,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    CardNotFound {
        card_id: CardId,
    },
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    DeckSizeMismatch {
        expected: usize,
        actual: usize,
    },
    IntegrityViolation {
        error: IntegrityError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    pub fn new(state: GameState, mut events: Vec<GameEvent>) -> Self {
        let victory = state.victory();
        if let Some(ref outcome) = victory {
            let has_event = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameWon { .. }));
            if !has_event {
                events.push(GameEvent::GameWon {
                    matched_pairs: outcome.matched_pairs,
                });
            }
        }

        Self {
            state,
            events,
            victory,
        }
    }
}

fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
    state
        .integrity_check()
        .map_err(|error| RuleError::IntegrityViolation { error })
}

/// 重置到新的一局：任何阶段 → Loading，纪元 +1，旧牌组整体作废。
pub fn reset(state: &mut GameState) -> Vec<GameEvent> {
    state.cards.clear();
    state.selection = Selection::Empty;
    state.matched_pairs = 0;
    state.phase = GamePhase::Loading;
    state.load_error = None;
    state.event_log.clear();
    state.epoch = state.epoch.wrapping_add(1);

    let event = GameEvent::GameReset { epoch: state.epoch };
    state.record_event(event.clone());
    vec![event]
}

/// 牌组加载完成：Loading → Memorizing，全部亮牌供玩家记忆。
pub fn load_deck(
    state: &mut GameState,
    epoch: u64,
    deck: Vec<Card>,
) -> Result<Vec<GameEvent>, RuleError> {
    if state.epoch != epoch {
        // 迟到的加载结果属于已被重置的上一局，直接丢弃。
        return Ok(Vec::new());
    }
    if state.phase != GamePhase::Loading {
        return Err(RuleError::InvalidPhase {
            expected: GamePhase::Loading,
            actual: state.phase,
        });
    }

    let expected = (state.pair_count as usize) * 2;
    if deck.len() != expected {
        return Err(RuleError::DeckSizeMismatch {
            expected,
            actual: deck.len(),
        });
    }

    state.cards = deck;
    for card in &mut state.cards {
        card.revealed = true;
        card.matched = false;
    }
    state.selection = Selection::Empty;
    state.matched_pairs = 0;
    state.load_error = None;
    state.phase = GamePhase::Memorizing;
    ensure_integrity(state)?;

    let event = GameEvent::DeckReady {
        pair_count: state.pair_count,
    };
    state.record_event(event.clone());
    Ok(vec![event])
}

/// 牌组加载失败：停留在 Loading 并记录错误，等待玩家显式重开。
pub fn mark_load_failed(
    state: &mut GameState,
    epoch: u64,
    message: impl Into<String>,
) -> Vec<GameEvent> {
    if state.epoch != epoch || state.phase != GamePhase::Loading {
        return Vec::new();
    }

    let message = message.into();
    state.load_error = Some(message.clone());
    let event = GameEvent::LoadFailed { message };
    state.record_event(event.clone());
    vec![event]
}

/// 记忆窗口结束：Memorizing → Playing，未配对的卡牌全部扣回。
pub fn finish_memorization(state: &mut GameState, epoch: u64) -> Vec<GameEvent> {
    if state.epoch != epoch || state.phase != GamePhase::Memorizing {
        return Vec::new();
    }

    for card in &mut state.cards {
        if !card.matched {
            card.revealed = false;
        }
    }
    state.phase = GamePhase::Playing;

    let event = GameEvent::MemorizationEnded;
    state.record_event(event.clone());
    vec![event]
}

/// 翻开一张卡牌。无效点击（已配对、已翻开、已在选择中、选择已满、
/// 非对局阶段）静默忽略；未知 id 属于视图缺陷，返回错误。
pub fn flip_card(state: &mut GameState, card_id: CardId) -> Result<Vec<GameEvent>, RuleError> {
    ensure_integrity(state)?;

    if state.phase != GamePhase::Playing {
        return Ok(Vec::new());
    }
    if state.selection.contains(card_id) {
        return Ok(Vec::new());
    }

    let next = match state.selection {
        Selection::Empty => Selection::One { card: card_id },
        Selection::One { card } => Selection::Two {
            first: card,
            second: card_id,
        },
        Selection::Two { .. } => return Ok(Vec::new()),
    };

    let card = state
        .card_mut(card_id)
        .ok_or(RuleError::CardNotFound { card_id })?;
    if card.matched || card.revealed {
        return Ok(Vec::new());
    }
    card.revealed = true;
    state.selection = next;

    let event = GameEvent::CardRevealed { card_id };
    state.record_event(event.clone());
    Ok(vec![event])
}

/// 判定当前的两张选择：同 species 则配对成功并保持翻开，否则双双扣回。
/// 只在选择已满时有效；携带的 epoch 用于丢弃上一局残留的定时器。
pub fn resolve_selection(state: &mut GameState, epoch: u64) -> Result<Vec<GameEvent>, RuleError> {
    if state.epoch != epoch || state.phase != GamePhase::Playing {
        return Ok(Vec::new());
    }
    ensure_integrity(state)?;

    let Some((first, second)) = state.selection.as_pair() else {
        return Ok(Vec::new());
    };

    let first_species = state
        .card(first)
        .ok_or(RuleError::CardNotFound { card_id: first })?
        .species
        .clone();
    let second_species = state
        .card(second)
        .ok_or(RuleError::CardNotFound { card_id: second })?
        .species
        .clone();

    let mut events = Vec::new();
    if first_species == second_species {
        for card_id in [first, second] {
            if let Some(card) = state.card_mut(card_id) {
                card.matched = true;
            }
        }
        state.matched_pairs += 1;
        let event = GameEvent::PairMatched {
            first,
            second,
            species: first_species,
        };
        state.record_event(event.clone());
        events.push(event);

        if state.all_pairs_matched() {
            state.phase = GamePhase::Won;
            let event = GameEvent::GameWon {
                matched_pairs: state.matched_pairs,
            };
            state.record_event(event.clone());
            events.push(event);
        }
    } else {
        for card_id in [first, second] {
            if let Some(card) = state.card_mut(card_id) {
                card.revealed = false;
            }
        }
        let event = GameEvent::PairMismatched { first, second };
        state.record_event(event.clone());
        events.push(event);
    }

    state.selection = Selection::Empty;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck_of(species: &[&str]) -> Vec<Card> {
        species
            .iter()
            .enumerate()
            .map(|(idx, name)| Card::new(idx as CardId, *name, None))
            .collect()
    }

    fn setup_playing() -> GameState {
        let mut state = GameState::new();
        state.pair_count = 2;
        let epoch = state.epoch;
        load_deck(
            &mut state,
            epoch,
            deck_of(&["abra", "abra", "bellsprout", "bellsprout"]),
        )
        .expect("deck should load");
        finish_memorization(&mut state, epoch);
        state
    }

    #[test]
    fn load_deck_reveals_everything_for_memorization() {
        let mut state = GameState::new();
        state.pair_count = 2;
        let epoch = state.epoch;
        let events = load_deck(
            &mut state,
            epoch,
            deck_of(&["abra", "abra", "bellsprout", "bellsprout"]),
        )
        .expect("deck should load");

        assert_eq!(state.phase, GamePhase::Memorizing);
        assert!(state.cards.iter().all(|card| card.revealed));
        assert_eq!(state.matched_pairs, 0);
        assert!(matches!(events.as_slice(), [GameEvent::DeckReady { .. }]));
    }

    #[test]
    fn memorization_elapsed_hides_cards_and_starts_play() {
        let mut state = GameState::new();
        state.pair_count = 2;
        let epoch = state.epoch;
        load_deck(
            &mut state,
            epoch,
            deck_of(&["abra", "abra", "bellsprout", "bellsprout"]),
        )
        .expect("deck should load");

        let events = finish_memorization(&mut state, epoch);
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(state.cards.iter().all(|card| !card.revealed));
        assert!(matches!(events.as_slice(), [GameEvent::MemorizationEnded]));
    }

    #[test]
    fn matching_pair_stays_revealed_and_counts() {
        let mut state = setup_playing();
        let epoch = state.epoch;

        flip_card(&mut state, 0).expect("first flip should apply");
        flip_card(&mut state, 1).expect("second flip should apply");
        assert!(state.selection.is_full());

        let events = resolve_selection(&mut state, epoch).expect("resolution should apply");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::PairMatched { .. })));

        for card_id in [0, 1] {
            let card = state.card(card_id).expect("card should exist");
            assert!(card.matched, "matched cards must keep matched flag");
            assert!(card.revealed, "matched cards must stay face up");
        }
        assert_eq!(state.matched_pairs, 1);
        assert_eq!(state.selection, Selection::Empty);
        state.integrity_check().expect("state should stay consistent");
    }

    #[test]
    fn mismatched_pair_flips_back() {
        let mut state = setup_playing();
        let epoch = state.epoch;

        flip_card(&mut state, 0).expect("first flip should apply");
        flip_card(&mut state, 2).expect("second flip should apply");

        let events = resolve_selection(&mut state, epoch).expect("resolution should apply");
        assert!(matches!(
            events.as_slice(),
            [GameEvent::PairMismatched { first: 0, second: 2 }]
        ));

        for card_id in [0, 2] {
            let card = state.card(card_id).expect("card should exist");
            assert!(!card.revealed, "mismatched cards must flip back");
            assert!(!card.matched);
        }
        assert_eq!(state.matched_pairs, 0);
        assert_eq!(state.selection, Selection::Empty);
    }

    #[test]
    fn clicks_on_matched_or_revealed_cards_are_ignored() {
        let mut state = setup_playing();
        let epoch = state.epoch;

        flip_card(&mut state, 0).expect("flip should apply");
        let repeat = flip_card(&mut state, 0).expect("repeat click is not an error");
        assert!(repeat.is_empty(), "clicking a revealed card must be a no-op");

        flip_card(&mut state, 1).expect("flip should apply");
        resolve_selection(&mut state, epoch).expect("resolution should apply");

        let before = state.clone();
        let ignored = flip_card(&mut state, 0).expect("click on matched card is not an error");
        assert!(ignored.is_empty());
        assert_eq!(state, before, "ignored clicks must not change state");
    }

    #[test]
    fn selection_never_grows_past_two() {
        let mut state = setup_playing();

        flip_card(&mut state, 0).expect("flip should apply");
        flip_card(&mut state, 2).expect("flip should apply");
        let third = flip_card(&mut state, 3).expect("overflow click is not an error");

        assert!(third.is_empty(), "a full selection must ignore further clicks");
        assert_eq!(
            state.selection,
            Selection::Two { first: 0, second: 2 }
        );
        let card = state.card(3).expect("card should exist");
        assert!(!card.revealed, "the ignored card must stay face down");
    }

    #[test]
    fn winning_final_pair_moves_to_won_and_freezes_input() {
        let mut state = setup_playing();
        let epoch = state.epoch;

        flip_card(&mut state, 0).expect("flip should apply");
        flip_card(&mut state, 1).expect("flip should apply");
        resolve_selection(&mut state, epoch).expect("resolution should apply");

        flip_card(&mut state, 2).expect("flip should apply");
        flip_card(&mut state, 3).expect("flip should apply");
        let events = resolve_selection(&mut state, epoch).expect("resolution should apply");

        assert_eq!(state.phase, GamePhase::Won);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::GameWon { matched_pairs: 2 })));

        let before = state.clone();
        let ignored = flip_card(&mut state, 0).expect("clicks after victory are not errors");
        assert!(ignored.is_empty());
        assert_eq!(state, before, "a won game must ignore further clicks");
    }

    #[test]
    fn duplicate_species_draw_still_pairs_up() {
        // 随机 id 重复时会出现四张同 species 的卡牌，任意两张都可配对。
        let mut state = GameState::new();
        state.pair_count = 2;
        let epoch = state.epoch;
        load_deck(&mut state, epoch, deck_of(&["abra", "abra", "abra", "abra"]))
            .expect("deck should load");
        finish_memorization(&mut state, epoch);

        flip_card(&mut state, 0).expect("flip should apply");
        flip_card(&mut state, 3).expect("flip should apply");
        resolve_selection(&mut state, epoch).expect("resolution should apply");

        assert_eq!(state.matched_pairs, 1);
        assert!(state.card(0).expect("card should exist").matched);
        assert!(state.card(3).expect("card should exist").matched);
        state.integrity_check().expect("state should stay consistent");
    }

    #[test]
    fn reset_returns_any_state_to_loading_and_bumps_epoch() {
        let mut state = setup_playing();
        let old_epoch = state.epoch;

        let events = reset(&mut state);
        assert_eq!(state.phase, GamePhase::Loading);
        assert!(state.cards.is_empty());
        assert_eq!(state.selection, Selection::Empty);
        assert_eq!(state.matched_pairs, 0);
        assert_eq!(state.epoch, old_epoch + 1);
        assert!(matches!(events.as_slice(), [GameEvent::GameReset { .. }]));
    }

    #[test]
    fn stale_resolve_timer_is_noop_against_new_game() {
        let mut state = setup_playing();
        let stale_epoch = state.epoch;

        flip_card(&mut state, 0).expect("flip should apply");
        flip_card(&mut state, 2).expect("flip should apply");

        // 判定定时器尚未触发时玩家重开了一局。
        reset(&mut state);
        let epoch = state.epoch;
        load_deck(
            &mut state,
            epoch,
            deck_of(&["caterpie", "caterpie", "diglett", "diglett"]),
        )
        .expect("deck should load");
        finish_memorization(&mut state, epoch);
        flip_card(&mut state, 0).expect("flip should apply");

        let before = state.clone();
        let stale = resolve_selection(&mut state, stale_epoch)
            .expect("stale resolution is not an error");
        assert!(stale.is_empty(), "stale timers must not touch the new game");
        assert_eq!(state, before);
    }

    #[test]
    fn late_deck_load_from_previous_game_is_discarded() {
        let mut state = GameState::new();
        state.pair_count = 2;
        let stale_epoch = state.epoch;
        reset(&mut state);

        let late = load_deck(
            &mut state,
            stale_epoch,
            deck_of(&["abra", "abra", "bellsprout", "bellsprout"]),
        )
        .expect("stale load is not an error");

        assert!(late.is_empty());
        assert_eq!(state.phase, GamePhase::Loading);
        assert!(state.cards.is_empty(), "stale decks must be discarded");
    }

    #[test]
    fn load_failure_keeps_loading_until_explicit_reset() {
        let mut state = GameState::new();
        let epoch = state.epoch;

        let events = mark_load_failed(&mut state, epoch, "creature 42 unavailable");
        assert_eq!(state.phase, GamePhase::Loading);
        assert_eq!(
            state.load_error.as_deref(),
            Some("creature 42 unavailable")
        );
        assert!(matches!(events.as_slice(), [GameEvent::LoadFailed { .. }]));

        let ignored = flip_card(&mut state, 0).expect("clicks while loading are not errors");
        assert!(ignored.is_empty());

        reset(&mut state);
        assert!(state.load_error.is_none(), "reset must clear the error");
    }

    #[test]
    fn unknown_card_id_is_a_view_defect() {
        let mut state = setup_playing();
        let result = flip_card(&mut state, 99);
        assert!(matches!(
            result,
            Err(RuleError::CardNotFound { card_id: 99 })
        ));
    }

    #[test]
    fn resolution_reports_victory_exactly_once() {
        let mut state = setup_playing();
        let epoch = state.epoch;
        flip_card(&mut state, 0).expect("flip should apply");
        flip_card(&mut state, 1).expect("flip should apply");
        resolve_selection(&mut state, epoch).expect("resolution should apply");
        flip_card(&mut state, 2).expect("flip should apply");
        flip_card(&mut state, 3).expect("flip should apply");
        let events = resolve_selection(&mut state, epoch).expect("resolution should apply");

        let resolution = RuleResolution::new(state, events);
        assert!(resolution.victory.is_some());
        let won_events = resolution
            .events
            .iter()
            .filter(|event| matches!(event, GameEvent::GameWon { .. }))
            .count();
        assert_eq!(won_events, 1, "GameWon must not be duplicated");
    }
}
