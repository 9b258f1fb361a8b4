//! Console input parsing.

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text for the whole room.
    Say(String),
    /// `/msg <nick> <text>`
    Private { to: String, text: String },
    /// `/block <nick>`
    Block(String),
    /// `/unblock <nick>`
    Unblock(String),
    /// `/blocked`
    Blocked,
    /// `/who`
    Who,
    /// `/peers`
    Peers,
    /// `/nick <new>`
    Nick(String),
    /// `/join <host:port>`
    Join(String),
    /// `/quit`
    Quit,
    /// `/help`
    Help,
}

pub const HELP: &str = "\
commands:
  <text>               message everyone
  /msg <nick> <text>   private message
  /block <nick>        hide messages from nick
  /unblock <nick>      show them again
  /blocked             list blocked nicks
  /who                 who is online
  /peers               connected peers
  /nick <new>          change nickname
  /join <host:port>    join a mesh
  /quit                leave";

/// Parse a console line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "msg" => {
            let (to, text) = args
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: /msg <nick> <text>".to_string())?;
            Command::Private {
                to: to.to_string(),
                text: text.trim().to_string(),
            }
        }
        "block" => Command::Block(required(args, "/block <nick>")?),
        "unblock" => Command::Unblock(required(args, "/unblock <nick>")?),
        "blocked" => Command::Blocked,
        "who" => Command::Who,
        "peers" => Command::Peers,
        "nick" => Command::Nick(required(args, "/nick <new>")?),
        "join" => Command::Join(required(args, "/join <host:port>")?),
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}

fn required(args: &str, usage: &str) -> Result<String, String> {
    if args.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(args.to_string())
    }
}
