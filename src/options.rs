//! Parsing Options.
//! `--model {name}` or `-m`, one of the bundled models in [`crate::models`]

use clap::{Arg, ArgAction, Command};
use std::error::Error;

use crate::config::SimConfig;
use crate::models::MODEL_NAMES;
use crate::net::OutputFormat;

fn make_options_parser() -> clap::Command {
    Command::new("pn")
        .no_binary_name(true)
        .args_override_self(true)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Simulate and explore bundled Petri net models")
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .help("The model to build")
                .default_value("mutex")
                .value_parser(MODEL_NAMES),
        )
        .arg(
            Arg::new("steps")
                .short('n')
                .long("steps")
                .help("Number of random firings")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML file with simulation settings")
                .default_value("pn.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the report will be stored, stdout if absent"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["json", "ron"]),
        )
        .arg(
            Arg::new("explore")
                .short('e')
                .long("explore")
                .help("Build the reachability graph instead of simulating")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Write the DOT rendering of the net, or of the reachability graph with --explore"),
        )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub model: String,
    pub steps: Option<usize>,
    pub seed: Option<u64>,
    pub config: String,
    pub output: Option<String>,
    pub format: Option<OutputFormat>,
    pub explore: bool,
    pub dot: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            model: "mutex".to_string(),
            steps: None,
            seed: None,
            config: "pn.toml".to_string(),
            output: None,
            format: None,
            explore: false,
            dot: None,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let model = matches
            .get_one::<String>("model")
            .cloned()
            .unwrap_or_else(|| "mutex".to_string());
        let config = matches
            .get_one::<String>("config")
            .cloned()
            .unwrap_or_else(|| "pn.toml".to_string());
        let format = match matches.get_one::<String>("format") {
            Some(raw) => Some(raw.parse::<OutputFormat>()?),
            None => None,
        };

        Ok(Options {
            model,
            steps: matches.get_one::<usize>("steps").copied(),
            seed: matches.get_one::<u64>("seed").copied(),
            config,
            output: matches.get_one::<String>("output").cloned(),
            format,
            explore: matches.get_flag("explore"),
            dot: matches.get_one::<String>("dot").cloned(),
        })
    }

    /// Flags given explicitly override the configuration file.
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_str() {
        let options =
            Options::parse_from_str("-m philosophers -n 20 --seed 7 -f ron --dot 'out dir/net.dot'")
                .unwrap();
        assert_eq!(options.model, "philosophers");
        assert_eq!(options.steps, Some(20));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.format, Some(OutputFormat::Ron));
        assert_eq!(options.dot.as_deref(), Some("out dir/net.dot"));
        assert!(!options.explore);
    }

    #[test]
    fn test_defaults() {
        let options = Options::parse_from_args(&[]).unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_parse_from_str_err() {
        assert!(Options::parse_from_str("-m unknown").is_err());
        assert!(Options::parse_from_str("-n lots").is_err());
        assert!(Options::parse_from_str("--dot 'unterminated").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let options = Options::parse_from_str("-e -s 3").unwrap();
        let mut config = SimConfig {
            steps: 5,
            ..SimConfig::default()
        };
        options.apply_to(&mut config);
        assert!(options.explore);
        assert_eq!(config.seed, 3);
        assert_eq!(config.steps, 5);
    }
}
