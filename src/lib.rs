pub mod game;
pub mod provider;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Function, Promise};

use game::{deck, rules};

pub use game::{
    Card, CardId, CardView, GameEvent, GamePhase, GameState, IntegrityError, RenderModel,
    RuleError, RuleResolution, Selection, VictoryState, CATALOG_SIZE, DEFAULT_PAIR_COUNT,
};
pub use provider::{CreatureSummary, ProviderError};

/// 记忆窗口时长（毫秒）：开局亮牌供玩家记忆的时间。
const MEMORIZE_MS: u32 = 3_000;
/// 判定窗口时长（毫秒）：第二张卡翻开后到配对判定之间的停顿。
const RESOLVE_MS: u32 = 1_000;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

struct Session {
    state: GameState,
    on_change: Option<Function>,
    memorize_timer: Option<Timeout>,
    resolve_timer: Option<Timeout>,
}

impl Session {
    fn new(state: GameState) -> Self {
        Self {
            state,
            on_change: None,
            memorize_timer: None,
            resolve_timer: None,
        }
    }

    fn cancel_timers(&mut self) {
        // 丢弃句柄即取消尚未触发的一次性定时器。
        self.memorize_timer = None;
        self.resolve_timer = None;
    }
}

/// 通知外部视图重新渲染。必须在所有可变借用之外调用，
/// 允许回调里同步再进入引擎。
fn notify(session: &Rc<RefCell<Session>>) {
    let (callback, model) = {
        let s = session.borrow();
        (s.on_change.clone(), s.state.render_model())
    };
    if let Some(callback) = callback {
        if let Ok(payload) = to_value(&model) {
            let _ = callback.call1(&JsValue::NULL, &payload);
        }
    }
}

fn arm_memorize_timer(session: &Rc<RefCell<Session>>, epoch: u64) {
    let timer_session = session.clone();
    let timeout = Timeout::new(MEMORIZE_MS, move || {
        let applied = {
            let mut s = timer_session.borrow_mut();
            s.memorize_timer = None;
            !rules::finish_memorization(&mut s.state, epoch).is_empty()
        };
        if applied {
            notify(&timer_session);
        }
    });
    session.borrow_mut().memorize_timer = Some(timeout);
}

fn arm_resolve_timer(session: &Rc<RefCell<Session>>, epoch: u64) {
    let timer_session = session.clone();
    let timeout = Timeout::new(RESOLVE_MS, move || {
        let applied = {
            let mut s = timer_session.borrow_mut();
            s.resolve_timer = None;
            match rules::resolve_selection(&mut s.state, epoch) {
                Ok(events) => !events.is_empty(),
                Err(_) => false,
            }
        };
        if applied {
            notify(&timer_session);
        }
    });
    session.borrow_mut().resolve_timer = Some(timeout);
}

#[wasm_bindgen]
pub struct GameEngine {
    session: Rc<RefCell<Session>>,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>) -> Result<GameEngine, JsValue> {
        let state = if let Some(json) = initial_state_json {
            serde_json::from_str(&json).map_err(serde_to_js_error)?
        } else {
            GameState::new()
        };
        Ok(GameEngine {
            session: Rc::new(RefCell::new(Session::new(state))),
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.borrow().state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        let mut s = self.session.borrow_mut();
        s.cancel_timers();
        s.state = state;
        Ok(())
    }

    /// 返回渲染模型（展示列表 + 阶段 + 错误信息），未翻开的卡牌不含图片。
    pub fn render(&self) -> Result<JsValue, JsValue> {
        to_value(&self.session.borrow().state.render_model()).map_err(JsValue::from)
    }

    pub fn render_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.borrow().state.render_model())
            .map_err(serde_to_js_error)
    }

    /// 注册状态变更回调。定时器触发的内部转移（记忆结束、配对判定）
    /// 也会经由该回调通知视图。
    pub fn set_on_change(&self, callback: Option<Function>) {
        self.session.borrow_mut().on_change = callback;
    }

    /// 开始新的一局：取消旧定时器、重置状态、重新并发拉取牌组。
    /// 返回的 Promise 在加载完成（或失败且已记录错误）后以判定结果
    /// JSON 兑现。
    pub fn new_game(&self) -> Promise {
        let session = self.session.clone();
        let epoch = {
            let mut s = session.borrow_mut();
            s.cancel_timers();
            rules::reset(&mut s.state);
            s.state.epoch
        };
        notify(&session);

        future_to_promise(async move {
            let pair_count = session.borrow().state.pair_count;
            let events = match deck::build_deck(pair_count).await {
                Ok(cards) => {
                    let mut s = session.borrow_mut();
                    rules::load_deck(&mut s.state, epoch, cards).map_err(to_js_error)?
                }
                Err(error) => {
                    web_sys::console::warn_1(&format!("deck load failed: {error}").into());
                    let mut s = session.borrow_mut();
                    rules::mark_load_failed(&mut s.state, epoch, error.to_string())
                }
            };

            let deck_ready = events
                .iter()
                .any(|event| matches!(event, GameEvent::DeckReady { .. }));
            if deck_ready {
                arm_memorize_timer(&session, epoch);
            }
            if !events.is_empty() {
                notify(&session);
            }

            let resolution = {
                let s = session.borrow();
                RuleResolution::new(s.state.clone(), events)
            };
            serde_json::to_string(&resolution)
                .map(|json| JsValue::from_str(&json))
                .map_err(serde_to_js_error)
        })
    }

    /// 处理一次点击意图，返回判定结果 JSON。选择集满两张时内部
    /// 安排延迟判定的定时器。
    pub fn click_card(&self, card_id: u32) -> Result<String, JsValue> {
        let (events, arm_epoch) = {
            let mut s = self.session.borrow_mut();
            let events = rules::flip_card(&mut s.state, card_id).map_err(to_js_error)?;
            let arm = !events.is_empty() && s.state.selection.is_full();
            let epoch = s.state.epoch;
            (events, arm.then_some(epoch))
        };

        if let Some(epoch) = arm_epoch {
            arm_resolve_timer(&self.session, epoch);
        }
        if !events.is_empty() {
            notify(&self.session);
        }

        let resolution = {
            let s = self.session.borrow();
            RuleResolution::new(s.state.clone(), events)
        };
        serde_json::to_string(&resolution).map_err(serde_to_js_error)
    }
}

/// 返回一个示例游戏状态，方便前端调试或初始化。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::sample()).map_err(JsValue::from)
}

/// 将传入的游戏状态渲染为展示列表。
#[wasm_bindgen(js_name = "renderState")]
pub fn render_state(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    to_value(&state.render_model()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "flipCard")]
pub fn flip_card(state: JsValue, card_id: u32) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    match rules::flip_card(&mut state, card_id) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "resolveSelection")]
pub fn resolve_selection(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let epoch = state.epoch;
    match rules::resolve_selection(&mut state, epoch) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "finishMemorization")]
pub fn finish_memorization(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let epoch = state.epoch;
    let events = rules::finish_memorization(&mut state, epoch);
    to_value(&RuleResolution::new(state, events)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "resetGame")]
pub fn reset_game(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let events = rules::reset(&mut state);
    to_value(&RuleResolution::new(state, events)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
