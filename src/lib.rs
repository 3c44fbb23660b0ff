pub mod cli;
mod commands;
pub mod dictionary;
pub mod llm_client;
pub mod managers;
pub mod pronunciation;
pub mod segmentation;
pub mod settings;
pub mod streaming;

use anyhow::Result;
use cli::{CliArgs, Command};
use dictionary::open_entry_store;
use log::{debug, info};
use managers::dictionary::DictionaryManager;
use managers::lookup_cache::LookupCache;
use pronunciation::{Lexicon, PinyinAnalyzer, PronunciationOracle};
use settings::AppSettings;
use std::process::ExitCode;
use std::sync::Arc;
use streaming::{Framing, Pipeline};

/// Process-wide shared services. Built once at startup; every request
/// borrows from it.
pub struct AppState {
    pub settings: AppSettings,
    pub dictionary: Arc<DictionaryManager>,
    pub oracle: Arc<PronunciationOracle>,
}

impl AppState {
    /// Opens the dictionary and wires the cache, analyzer and oracle.
    /// A missing or unreadable dictionary is fatal.
    pub fn initialize(settings: AppSettings) -> Result<Self> {
        let store = open_entry_store(&settings.dictionary_path)?;
        let cache = Arc::new(LookupCache::new(
            settings.lookup_cache_capacity,
            settings.segmentation_cache_capacity,
        ));
        let dictionary = Arc::new(DictionaryManager::new(store, cache));

        let lexicon: Arc<dyn Lexicon> = dictionary.clone();
        let analyzer = PinyinAnalyzer::new()
            .with_lexicon(lexicon)
            .with_max_chars(settings.max_sentence_chars);
        let oracle = Arc::new(PronunciationOracle::new(Arc::new(analyzer)));

        info!(
            "Initialized with {} dictionary entries from {}",
            dictionary.entry_count(),
            settings.dictionary_path.display()
        );

        Ok(Self {
            settings,
            dictionary,
            oracle,
        })
    }

    pub fn pipeline(&self, framing: Framing) -> Pipeline {
        Pipeline::new(
            self.oracle.clone(),
            self.settings.transducer.clone(),
            framing,
        )
    }
}

/// Applies command-line overrides to loaded settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &CliArgs) {
    if let Some(path) = &args.dictionary {
        settings.dictionary_path = path.clone();
    }
    if args.debug {
        settings.debug_mode = true;
    }
}

pub async fn run(args: CliArgs, mut settings: AppSettings) -> Result<ExitCode> {
    apply_cli_overrides(&mut settings, &args);
    let state = AppState::initialize(settings)?;

    let code = match &args.command {
        Command::Lookup { token } => commands::lookup::lookup(&state, token)?,
        Command::Pinyin { sentence } => commands::pinyin::pinyin(&state, sentence)?,
        Command::Correct {
            sentence,
            input,
            framing,
            chunk_size,
        } => {
            commands::correct::correct(&state, sentence, input.as_deref(), *framing, *chunk_size)
                .await?
        }
        Command::Stream { sentence } => commands::stream::stream(&state, sentence).await?,
    };

    let stats = state.dictionary.cache_stats();
    debug!(
        "Lookup cache: entries {}/{} hit/miss ({} evicted), decompositions {}/{} ({} evicted)",
        stats.entries.hits,
        stats.entries.misses,
        stats.entries.evictions,
        stats.decompositions.hits,
        stats.decompositions.misses,
        stats.decompositions.evictions
    );
    Ok(code)
}
