use crate::streaming::Framing;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hanzi-gloss",
    version,
    about = "Hanzi Gloss - pronunciation-corrected Chinese segmentation"
)]
pub struct CliArgs {
    /// Settings file (defaults to hanzi_gloss_settings.json in the working directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Dictionary file (.json or SQLite), overrides the settings file
    #[arg(long, global = true)]
    pub dictionary: Option<PathBuf>,

    /// Enable debug mode with verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Look up a token, decomposing it when it has no direct entry
    Lookup { token: String },

    /// Print the contextual tone-number reading of every character
    Pinyin { sentence: String },

    /// Correct a captured segmentation stream (file or stdin) to stdout
    Correct {
        /// The sentence the stream segments
        #[arg(long)]
        sentence: String,

        /// Captured stream; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Upstream framing, overrides the settings file
        #[arg(long, value_enum)]
        framing: Option<Framing>,

        /// Read size in bytes
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },

    /// Request a segmentation from the LLM and print the corrected stream
    Stream {
        #[arg(long)]
        sentence: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_correct() {
        let args = CliArgs::parse_from([
            "hanzi-gloss",
            "--debug",
            "correct",
            "--sentence",
            "你好吗？",
            "--framing",
            "raw",
        ]);
        assert!(args.debug);
        match args.command {
            Command::Correct {
                sentence,
                input,
                framing,
                chunk_size,
            } => {
                assert_eq!(sentence, "你好吗？");
                assert!(input.is_none());
                assert_eq!(framing, Some(Framing::Raw));
                assert_eq!(chunk_size, 4096);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["hanzi-gloss", "lookup", "你好吗", "--dictionary", "d.json"]);
        assert_eq!(args.dictionary, Some(PathBuf::from("d.json")));
        assert!(matches!(args.command, Command::Lookup { ref token } if token == "你好吗"));
    }

    #[test]
    fn test_event_stream_value_name() {
        let args = CliArgs::parse_from([
            "hanzi-gloss",
            "correct",
            "--sentence",
            "你",
            "--framing",
            "event-stream",
        ]);
        assert!(matches!(
            args.command,
            Command::Correct {
                framing: Some(Framing::EventStream),
                ..
            }
        ));
    }
}
