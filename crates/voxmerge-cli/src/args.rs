use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use voxmerge_core::AugmentConfig;

pub(crate) const USAGE: &str = "\
Usage:
  voxmerge [augment] [options] <path>...
  voxmerge split [--duration <seconds>] [options] <path>...
  voxmerge separate [options] <path>...

Paths may be .mid/.midi files or folders holding them.

Common options:
  --config <file>               TOML file with any of the options below
  --target_folder <path>        where results are stored (default ./generated/)
  --workers <n>                 worker threads (default: available cores)
  --verbose                     debug logging
  --help                        show this text

Augment options:
  --interval_note <C-B>         base note of the transpose interval
  --interval_low <0-8>          lower octave of the transpose interval
  --interval_high <0-8>         upper octave of the transpose interval
  --time_signature <n/d>        time signature of every output
  --instrument <name|program>   instrument of every output part
  --clef <name>                 clef of every output part
  --voice_num <n>               number of voices per output
  --voice_distribution <f>...   share of groupings kept per voice (0.0-1.0]
  --quantization <1-6>...       grid divisions per quarter, one output each
  --part_ratio <0.0-1.0>        minimum share of notes a part needs

Split options:
  --duration <seconds>          length of every slice (default 60)";

pub(crate) const DEFAULT_SPLIT_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Augment,
    Split { seconds: u64 },
    Separate,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cli {
    pub command: Command,
    pub paths: Vec<PathBuf>,
    pub config_file: Option<PathBuf>,
    /// Option name (underscored) and its values, in the order given
    pub overrides: Vec<(String, Vec<String>)>,
    pub verbose: bool,
    pub help: bool,
}

/// Parse everything after the program name
pub(crate) fn parse(args: &[String]) -> Result<Cli> {
    let mut rest = args;
    let mut command = Command::Augment;
    match rest.first().map(String::as_str) {
        Some("augment") => rest = &rest[1..],
        Some("split") => {
            command = Command::Split { seconds: DEFAULT_SPLIT_SECONDS };
            rest = &rest[1..];
        }
        Some("separate") => {
            command = Command::Separate;
            rest = &rest[1..];
        }
        _ => {}
    }

    let mut cli = Cli {
        command,
        paths: Vec::new(),
        config_file: None,
        overrides: Vec::new(),
        verbose: false,
        help: false,
    };

    let mut i = 0;
    while i < rest.len() {
        let arg = &rest[i];
        i += 1;
        let Some(flag) = arg.strip_prefix("--") else {
            cli.paths.push(PathBuf::from(arg));
            continue;
        };
        let key = flag.replace('-', "_");
        match key.as_str() {
            "verbose" => cli.verbose = true,
            "help" => cli.help = true,
            _ => {
                let start = i;
                while i < rest.len() && !rest[i].starts_with("--") {
                    i += 1;
                }
                let values = &rest[start..i];
                if values.is_empty() {
                    bail!("--{flag} needs a value");
                }
                match key.as_str() {
                    "config" => cli.config_file = Some(PathBuf::from(single(&key, values)?)),
                    "duration" => {
                        let Command::Split { seconds } = &mut cli.command else {
                            bail!("--duration only applies to the split command");
                        };
                        *seconds = parse_single(&key, values)?;
                        if *seconds == 0 {
                            bail!("--duration must be at least 1 second");
                        }
                    }
                    _ if is_multi(&key) => cli.overrides.push((key.clone(), values.to_vec())),
                    _ => {
                        // Single-valued options take one value; the rest are paths
                        cli.overrides.push((key.clone(), vec![values[0].clone()]));
                        cli.paths.extend(values[1..].iter().map(PathBuf::from));
                    }
                }
            }
        }
    }
    Ok(cli)
}

fn is_multi(key: &str) -> bool {
    matches!(key, "voice_distribution" | "quantization")
}

fn single<'a>(key: &str, values: &'a [String]) -> Result<&'a str> {
    match values {
        [value] => Ok(value),
        _ => Err(anyhow!("--{key} takes exactly one value")),
    }
}

fn parse_single<T>(key: &str, values: &[String]) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = single(key, values)?;
    value
        .parse()
        .with_context(|| format!("invalid value '{value}' for --{key}"))
}

fn parse_list<T>(key: &str, values: &[String]) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    values
        .iter()
        .map(|v| v.parse().with_context(|| format!("invalid value '{v}' for --{key}")))
        .collect()
}

/// Apply command-line options on top of a loaded config
pub(crate) fn apply_overrides(config: &mut AugmentConfig, overrides: &[(String, Vec<String>)]) -> Result<()> {
    for (key, values) in overrides {
        match key.as_str() {
            "target_folder" => config.target_folder = PathBuf::from(single(key, values)?),
            "interval_note" => config.interval_note = single(key, values)?.to_string(),
            "interval_low" => config.interval_low = parse_single(key, values)?,
            "interval_high" => config.interval_high = parse_single(key, values)?,
            "time_signature" => config.time_signature = single(key, values)?.to_string(),
            "instrument" => config.instrument = single(key, values)?.to_string(),
            "clef" => config.clef = single(key, values)?.to_string(),
            "voice_num" => config.voice_num = parse_single(key, values)?,
            "voice_distribution" => config.voice_distribution = parse_list(key, values)?,
            "quantization" => config.quantization = parse_list(key, values)?,
            "part_ratio" => config.part_ratio = parse_single(key, values)?,
            "workers" => config.workers = Some(parse_single(key, values)?),
            other => bail!("unknown option --{other}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_default_command_and_paths() {
        let cli = parse(&args("a.mid --voice_num 3 b.mid --verbose")).unwrap();
        assert_eq!(cli.command, Command::Augment);
        assert_eq!(cli.paths, vec![PathBuf::from("a.mid"), PathBuf::from("b.mid")]);
        assert_eq!(cli.overrides, vec![("voice_num".to_string(), vec!["3".to_string()])]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_multi_value_options() {
        let cli = parse(&args("augment --voice-distribution 0.5 0.5 --quantization 4 3 --part_ratio 0.1 x.mid")).unwrap();
        let mut config = AugmentConfig::default();
        apply_overrides(&mut config, &cli.overrides).unwrap();
        assert_eq!(config.voice_distribution, vec![0.5, 0.5]);
        assert_eq!(config.quantization, vec![4, 3]);
        assert_eq!(config.part_ratio, 0.1);
        assert_eq!(cli.paths, vec![PathBuf::from("x.mid")]);
    }

    #[test]
    fn test_split_duration() {
        let cli = parse(&args("split --duration 30 song.mid")).unwrap();
        assert_eq!(cli.command, Command::Split { seconds: 30 });
        assert!(parse(&args("split --duration 0 song.mid")).is_err());
        assert!(parse(&args("--duration 30 song.mid")).is_err());
    }

    #[test]
    fn test_bad_values() {
        assert!(parse(&args("--voice_num")).is_err());
        let cli = parse(&args("--interval_low eight a.mid")).unwrap();
        let mut config = AugmentConfig::default();
        assert!(apply_overrides(&mut config, &cli.overrides).is_err());
        let cli = parse(&args("--colour blue a.mid")).unwrap();
        assert!(apply_overrides(&mut config, &cli.overrides).is_err());
    }
}
