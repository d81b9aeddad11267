#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Refresh,
    Exclude(String),
    Regenerate,
    Stats,
    BotStatus,
    NewData,
    Help,
    Unknown(String),
}

pub const USAGE: &str = "\
usage: followsync <command>

commands:
  show            print the cached dashboard, fetching once when empty
  refresh         fetch the dashboard from the backend
  exclude <id>    drop a user from the cached non-follower list
  regenerate      recompute the non-follower list on the backend
  stats           print follower and following counts
  bot-status      print the last automation run report
  new-data        report whether the backend has unseen results
  help            print this message";

pub fn parse_command<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Command::Show;
    };

    match first.as_ref().trim() {
        "show" => Command::Show,
        "refresh" => Command::Refresh,
        "exclude" => match args.next() {
            Some(id) if !id.as_ref().trim().is_empty() => {
                Command::Exclude(id.as_ref().trim().to_string())
            }
            _ => Command::Unknown("exclude (missing id)".to_string()),
        },
        "regenerate" => Command::Regenerate,
        "stats" => Command::Stats,
        "bot-status" => Command::BotStatus,
        "new-data" => Command::NewData,
        "help" | "-h" | "--help" => Command::Help,
        other => Command::Unknown(other.to_string()),
    }
}
