//! CLI argument definitions for guardian
//!
//! Uses clap for argument parsing. This module defines all subcommands
//! and their options.

use clap::{Args, Parser, Subcommand, ValueEnum};
use guardian::{Category, MatchStrategy};
use std::net::IpAddr;
use std::path::PathBuf;

/// guardian - a local proxy that drops connections to blocked domains
#[derive(Parser, Debug)]
#[command(name = "guardian")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the blocking proxy until interrupted
    #[command(after_help = "EXAMPLES:
    # Block the default and tracker lists on port 8888
    guardian run --category default --category trackers

    # Listen on another port with exact wildcard matching
    guardian run --port 3128 --strategy trie

    # Reload the user lists of a running proxy (Unix)
    kill -HUP <pid>
")]
    Run(RunArgs),

    /// Classify URLs against the configured lists and exit
    #[command(after_help = "EXAMPLES:
    # Check a few hosts
    guardian check https://ads.example.com/banner tracker.net:443

    # Check against the gambling list only
    guardian check --category gambling casino.example
")]
    Check(CheckArgs),

    /// Open the user blacklist or whitelist in $VISUAL / $EDITOR
    #[command(after_help = "EXAMPLES:
    # Add hosts that must always be blocked
    guardian edit blacklist

    # Use a specific list directory
    guardian edit whitelist --lists ~/.config/guardian/lists
")]
    Edit(EditArgs),
}

/// Where configuration and lists come from.
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Configuration file path
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding blacklist.txt, whitelist.txt and filters/
    #[arg(long, value_name = "DIR")]
    pub lists: Option<PathBuf>,
}

/// Which lists are enforced and how they are matched.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[command(flatten)]
    pub location: LocationArgs,

    /// Enable a bundled category (repeatable; replaces the configured set)
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<Category>,

    /// Matching strategy for every category
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    /// Port to listen on (0 picks a free port)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,

    /// Wait up to this many milliseconds for open connections on shutdown
    #[arg(long, value_name = "MS")]
    pub drain_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// URLs or host[:port] targets to classify
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// List to edit
    #[arg(value_enum)]
    pub list: UserList,

    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Exact `*.domain` wildcard rules
    Trie,
    /// Probabilistic whole-domain filter
    Cuckoo,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Trie => MatchStrategy::Trie,
            StrategyArg::Cuckoo => MatchStrategy::Cuckoo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UserList {
    Blacklist,
    Whitelist,
}

impl From<UserList> for Category {
    fn from(list: UserList) -> Self {
        match list {
            UserList::Blacklist => Category::Blacklist,
            UserList::Whitelist => Category::Whitelist,
        }
    }
}
