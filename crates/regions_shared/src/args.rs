/// Global arguments provided at process start
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Path to the labwc config file holding the regions
    pub config: Option<String>,
    /// Path to a file that receives the log output instead of stderr
    pub log_file: Option<String>,
}

impl GlobalArgs {
    /// Parse global arguments, excluding the program name. `None` indicates that the program
    /// should exit.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    print_help();
                    return None;
                }
                "-c" | "--config" => parsed.config = Some(args.next().or_else(missing_value)?),
                "-l" | "--log-file" => parsed.log_file = Some(args.next().or_else(missing_value)?),
                _ => {
                    if let Some(path) = arg.strip_prefix("--config=") {
                        parsed.config = Some(path.to_owned());
                    } else if let Some(path) = arg.strip_prefix("--log-file=") {
                        parsed.log_file = Some(path.to_owned());
                    } else {
                        eprintln!("Unknown argument: {arg}");
                        print_help();
                        return None;
                    }
                }
            }
        }

        Some(parsed)
    }
}

fn missing_value() -> Option<String> {
    print_help();
    None
}

fn print_help() {
    println!("Usage: labwc-regions [OPTIONS]");
    println!("Options:");
    println!("  -c, --config <file>      Specify config file (with path)");
    println!("  -l, --log-file <file>    Append log output to the given file");
    println!("  -h, --help               Print this help message and exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<GlobalArgs> {
        GlobalArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn no_arguments_uses_defaults() {
        assert_eq!(parse(&[]), Some(GlobalArgs::default()));
    }

    #[test]
    fn config_path_short_and_long() {
        let args = parse(&["-c", "/tmp/rc.xml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("/tmp/rc.xml"));

        let args = parse(&["--config", "rc.xml", "--log-file", "log.txt"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("rc.xml"));
        assert_eq!(args.log_file.as_deref(), Some("log.txt"));

        let args = parse(&["--config=other.xml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("other.xml"));
    }

    #[test]
    fn help_exits() {
        assert_eq!(parse(&["--help"]), None);
        assert_eq!(parse(&["-c", "rc.xml", "-h"]), None);
    }

    #[test]
    fn missing_value_or_unknown_argument_exits() {
        assert_eq!(parse(&["--config"]), None);
        assert_eq!(parse(&["--verbose"]), None);
    }
}
