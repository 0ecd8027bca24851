use std::net::IpAddr;
use std::str::FromStr;

use dns_types::protocol::types::{Question, RecordType};

/// One line of input.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    /// Nothing to do: a blank line or a comment.
    Nothing,
    /// Use a different root nameserver from now on.
    Server(IpAddr),
    /// Turn verbose tracing on or off.
    Trace(bool),
    Lookup(Question),
    /// Print everything in the cache.
    Dump,
    Quit,
}

/// Why a line could not be understood.  The `Display` form is what
/// gets shown to the user.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid root server ({0}).")]
    BadServer(String),

    #[error("Invalid call. Format:\n\tserver IP")]
    ServerUsage,

    #[error("Invalid call. Format:\n\ttrace on|off")]
    TraceUsage,

    #[error("Invalid query type. Must be one of:\n\tA, AAAA, NS, CNAME, SOA, MX, TYPE<n>")]
    BadType(String),

    #[error("Invalid call. Format:\n\tlookup hostName [type]")]
    LookupUsage,

    #[error("Invalid command. Valid commands are:\n\tlookup fqdn [type]\n\ttrace on|off\n\tserver IP\n\tdump\n\tquit")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    /// Parse a line.  Anything after a `#` is a comment.  Command
    /// words, trace options, and record types are case-insensitive.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.split('#').next().unwrap_or_default();
        let args: Vec<&str> = line.split_whitespace().collect();

        let Some(command) = args.first() else {
            return Ok(Command::Nothing);
        };

        match command.to_ascii_lowercase().as_str() {
            "quit" | "exit" => Ok(Command::Quit),
            "dump" => Ok(Command::Dump),
            "server" => match args[1..] {
                [address] => IpAddr::from_str(address)
                    .map(Command::Server)
                    .map_err(|_| CommandError::BadServer(address.to_string())),
                _ => Err(CommandError::ServerUsage),
            },
            "trace" => match args[1..] {
                [option] if option.eq_ignore_ascii_case("on") => Ok(Command::Trace(true)),
                [option] if option.eq_ignore_ascii_case("off") => Ok(Command::Trace(false)),
                _ => Err(CommandError::TraceUsage),
            },
            "lookup" | "l" => match args[1..] {
                [name] => Ok(Command::Lookup(Question::new(relative(name), RecordType::A))),
                [name, rtype] => RecordType::from_str(&rtype.to_ascii_uppercase())
                    .map(|rtype| Command::Lookup(Question::new(relative(name), rtype)))
                    .map_err(|_| CommandError::BadType(rtype.to_string())),
                _ => Err(CommandError::LookupUsage),
            },
            _ => Err(CommandError::Unknown(command.to_string())),
        }
    }
}

/// Drop one trailing `.`: decoded names never have one, so a name
/// with it would never match a record or a cache key.
fn relative(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}
