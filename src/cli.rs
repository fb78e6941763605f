//! Command-line surface.
//!
//! Positional arguments keep the historical `csrfcookie sessionid mailbox
//! lower upper` order; the dash options take priority over them.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use secrecy::SecretString;

use crate::config::{ArchiveConfig, CollisionPolicy, ShowFields, SortOrder, WebmailConfig};
use crate::error::InputError;
use crate::session::cache::DEFAULT_CACHE_FILE;
use crate::session::{CookiePair, CredentialInput};
use crate::window::{Bounds, MAX_WINDOW_SPAN};

const ABOUT: &str = "Archive webmail messages to local .eml files, a bounded window at a time.";

const AFTER_HELP: &str = "\
Either pass the csrftoken and sessionid cookies of a logged-in browser session,
or log in with --name/--password. Cookies issued by a login are cached and
substituted the next time the same pair is supplied.

The backend refuses windows whose bounds differ by more than 500. Use --auto
to walk the whole folder. With --trash or --delete every archived message is moved to
Trash right after it is saved; --delete then empties Trash.";

#[derive(Parser)]
#[command(name = "webmail-archiver", version, about = ABOUT, after_help = AFTER_HELP)]
pub struct Args {
    /// Value of the `csrftoken` session cookie.
    pub csrfcookie: Option<String>,

    /// Value of the `sessionid` session cookie.
    pub sessionid: Option<String>,

    /// The folder to download from.
    #[arg(default_value = "INBOX")]
    pub mailbox: String,

    /// First listing position of the window (1-based).
    #[arg(default_value_t = 1)]
    pub lowerbound: u32,

    /// Last listing position of the window (inclusive).
    #[arg(default_value_t = MAX_WINDOW_SPAN)]
    pub upperbound: u32,

    /// The folder to download from (overrides the positional MAILBOX).
    #[arg(short = 'm', long = "mailbox", value_name = "MAILBOX")]
    pub mailbox_option: Option<String>,

    /// The lower and upper bound (overrides the positional bounds).
    #[arg(short = 'b', long = "bound", num_args = 2, value_names = ["LOWER", "UPPER"])]
    pub bound: Option<Vec<u32>>,

    /// Account name, or full address when --domain is omitted.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Account domain; taken from the address in --name if not given.
    #[arg(short = 'D', long)]
    pub domain: Option<String>,

    /// Account password.
    #[arg(short = 'p', long, env = "WEBMAIL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Move each downloaded message to Trash.
    #[arg(short = 't', long)]
    pub trash: bool,

    /// Move each downloaded message to Trash, then empty Trash.
    #[arg(short = 'd', long)]
    pub delete: bool,

    /// Print more detail (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// List your folders and exit.
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Keep fetching windows until the folder is exhausted.
    #[arg(short = 'a', long)]
    pub auto: bool,

    /// What to do when a message was already downloaded.
    #[arg(long, value_enum)]
    pub policy: Option<CollisionPolicy>,

    /// Carry on without trashing or deleting when a message was already
    /// downloaded, instead of aborting.
    #[arg(long = "no-stop-on-existing", alias = "dontexitonfirstsignoftrouble")]
    pub no_stop_on_existing: bool,

    /// Show each message's subject.
    #[arg(long)]
    pub subject: bool,

    /// Show each message's sender.
    #[arg(long)]
    pub sender: bool,

    /// Show whether each message has attachments.
    #[arg(long)]
    pub attachment: bool,

    /// Directory receiving the .eml files.
    #[arg(short = 'o', long, default_value = "emails_output_dir")]
    pub output_dir: PathBuf,

    /// Cookie cache file.
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    pub cookie_cache: PathBuf,

    /// Webmail backend (scheme and host). Defaults to WEBMAIL_BASE_URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Listing order for single-window runs; auto mode always lists oldest first.
    #[arg(long, value_enum)]
    pub sort: Option<SortOrder>,

    /// Also write logs to daily rolling files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// Run options. Bounds are checked here, before anything touches the network.
    pub fn archive_config(&self) -> Result<ArchiveConfig, InputError> {
        let (lower, upper) = match self.bound.as_deref() {
            Some([lower, upper]) => (*lower, *upper),
            _ => (self.lowerbound, self.upperbound),
        };

        Ok(ArchiveConfig {
            folder: self
                .mailbox_option
                .clone()
                .unwrap_or_else(|| self.mailbox.clone()),
            bounds: Bounds::new(lower, upper)?,
            auto: self.auto,
            trash: self.trash,
            delete: self.delete,
            stop_on_existing: !self.no_stop_on_existing,
            collision: self.policy,
            output_dir: self.output_dir.clone(),
            show: ShowFields {
                subject: self.subject,
                sender: self.sender,
                attachment: self.attachment,
            },
            sort: self.sort.unwrap_or_default(),
        })
    }

    /// Session cookies, when both were supplied.
    pub fn cookie_pair(&self) -> Option<CookiePair> {
        match (&self.csrfcookie, &self.sessionid) {
            (Some(csrftoken), Some(sessionid)) => Some(CookiePair {
                csrftoken: csrftoken.clone(),
                sessionid: sessionid.clone(),
            }),
            _ => None,
        }
    }

    pub fn credential_input(&self) -> CredentialInput {
        CredentialInput {
            name: self.name.clone(),
            domain: self.domain.clone(),
            password: self.password.clone().map(SecretString::from),
        }
    }

    /// Backend settings from the environment, with --base-url on top.
    pub fn webmail_config(&self) -> WebmailConfig {
        let mut config = WebmailConfig::from_env();
        if let Some(url) = &self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config
    }

    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("webmail-archiver").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn positional_defaults() {
        let args = parse(&[]);
        let config = args.archive_config().unwrap();
        assert_eq!(config.folder, "INBOX");
        assert_eq!(config.bounds, Bounds::new(1, 500).unwrap());
        assert!(config.stop_on_existing);
        assert!(!config.destructive());
        assert!(args.cookie_pair().is_none());
        assert_eq!(args.cookie_cache, PathBuf::from(".uidconf"));
    }

    #[test]
    fn positionals_in_historical_order() {
        let args = parse(&["csrf", "sess", "Sent", "20", "40"]);
        let config = args.archive_config().unwrap();
        assert_eq!(config.folder, "Sent");
        assert_eq!(config.bounds, Bounds::new(20, 40).unwrap());

        let cookies = args.cookie_pair().unwrap();
        assert_eq!(cookies.csrftoken, "csrf");
        assert_eq!(cookies.sessionid, "sess");
    }

    #[test]
    fn dash_options_override_positionals() {
        let args = parse(&["csrf", "sess", "Sent", "20", "40", "-m", "Archive", "-b", "5", "9"]);
        let config = args.archive_config().unwrap();
        assert_eq!(config.folder, "Archive");
        assert_eq!(config.bounds, Bounds::new(5, 9).unwrap());
    }

    #[test]
    fn oversized_window_is_input_error() {
        let args = parse(&["-b", "1", "502"]);
        assert!(matches!(
            args.archive_config(),
            Err(InputError::WindowTooWide { lower: 1, upper: 502, .. })
        ));

        let inverted = parse(&["-b", "10", "2"]);
        assert!(matches!(
            inverted.archive_config(),
            Err(InputError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn legacy_interlock_flag_is_accepted() {
        let args = parse(&["--dontexitonfirstsignoftrouble", "-d"]);
        let config = args.archive_config().unwrap();
        assert!(!config.stop_on_existing);
        assert!(config.delete);
    }

    #[test]
    fn policy_and_display_flags() {
        let args = parse(&["--policy", "disambiguate", "--subject", "--attachment", "-a"]);
        let config = args.archive_config().unwrap();
        assert_eq!(config.collision, Some(CollisionPolicy::Disambiguate));
        assert!(config.show.subject);
        assert!(!config.show.sender);
        assert!(config.show.attachment);
        assert!(config.auto);
    }

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(parse(&[]).log_level(), "info");
        assert_eq!(parse(&["-v"]).log_level(), "debug");
        assert_eq!(parse(&["-vvv"]).log_level(), "trace");
    }

    #[test]
    fn credentials_are_passed_through() {
        let args = parse(&["-n", "alice@example.org", "-p", "secret"]);
        let creds = args.credential_input().resolve().unwrap();
        assert_eq!(creds.name, "alice");
        assert_eq!(creds.domain, "example.org");
    }
}
