use crate::pronunciation::PronunciationMap;
use crate::AppState;
use anyhow::{Context, Result};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Serialize)]
struct CharReading {
    offset: usize,
    character: char,
    syllable: Option<String>,
}

#[derive(Serialize)]
struct PinyinOutput<'a> {
    sentence: &'a str,
    readings: Vec<CharReading>,
}

fn readings(map: &PronunciationMap) -> Vec<CharReading> {
    map.sentence()
        .chars()
        .enumerate()
        .map(|(offset, character)| CharReading {
            offset,
            character,
            syllable: map.syllable_at(offset).map(str::to_string),
        })
        .collect()
}

pub fn pinyin(state: &AppState, sentence: &str) -> Result<ExitCode> {
    let map = state
        .oracle
        .build_map(sentence)
        .context("Failed to analyze sentence")?;

    let output = PinyinOutput {
        sentence: map.sentence(),
        readings: readings(&map),
    };
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize readings")?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}
