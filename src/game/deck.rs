use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::js_sys::{Array, Promise};

use serde_wasm_bindgen::{from_value, to_value};

use super::state::{Card, CardId};
use crate::provider::{self, CreatureSummary, ProviderError};

/// 生物目录的 id 上限，随机抽取范围为 1..=CATALOG_SIZE。
pub const CATALOG_SIZE: u32 = 151;

/// 抽取本局使用的生物 id。与数据源行为保持一致：不去重，
/// 抽到重复 id 时同一 species 会出现四张卡牌。
pub fn draw_species_ids(rng: &mut impl Rng, pair_count: u32, catalog_size: u32) -> Vec<u32> {
    (0..pair_count)
        .map(|_| rng.gen_range(1..=catalog_size))
        .collect()
}

/// 每只生物铺两张卡牌（id 各不相同），再整体均匀洗牌。
pub fn assemble_deck(summaries: &[CreatureSummary], rng: &mut impl Rng) -> Vec<Card> {
    let mut deck = Vec::with_capacity(summaries.len() * 2);
    let mut next_id: CardId = 0;
    for summary in summaries {
        for _ in 0..2 {
            deck.push(Card::new(
                next_id,
                summary.name.clone(),
                summary.sprite.clone(),
            ));
            next_id += 1;
        }
    }
    deck.shuffle(rng);
    deck
}

/// 并发拉取全部生物并构建洗好的新牌组。任一请求失败则整组失败，
/// 不产出不完整的牌组。
pub async fn build_deck(pair_count: u32) -> Result<Vec<Card>, ProviderError> {
    let mut rng = SmallRng::from_entropy();
    let ids = draw_species_ids(&mut rng, pair_count, CATALOG_SIZE);
    let summaries = fetch_all(&ids).await?;
    Ok(assemble_deck(&summaries, &mut rng))
}

async fn fetch_all(ids: &[u32]) -> Result<Vec<CreatureSummary>, ProviderError> {
    let promises = Array::new();
    for &id in ids {
        let promise = future_to_promise(async move {
            let summary = provider::fetch_creature(provider::API_BASE, id)
                .await
                .map_err(|error| {
                    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
                })?;
            to_value(&summary).map_err(JsValue::from)
        });
        promises.push(&promise);
    }

    let settled = JsFuture::from(Promise::all(&promises))
        .await
        .map_err(ProviderError::from_js)?;

    let values = Array::from(&settled);
    let mut summaries = Vec::with_capacity(values.length() as usize);
    for value in values.iter() {
        let summary: CreatureSummary = from_value(value).map_err(|err| ProviderError::Decode {
            message: err.to_string(),
        })?;
        summaries.push(summary);
    }
    Ok(summaries)
}
