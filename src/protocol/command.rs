#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    ConfigGet,
    ConfigSave,
    Parse,
    Translate,
    FailuresList,
    Retry,
    Terminate,
    Compare,
    Check,
    Fix,
    TestConnection,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "config.get" => Command::ConfigGet,
            "config.save" => Command::ConfigSave,
            "parse" => Command::Parse,
            "translate" => Command::Translate,
            "failures.list" => Command::FailuresList,
            "retry" => Command::Retry,
            "terminate" => Command::Terminate,
            "compare" => Command::Compare,
            "check" => Command::Check,
            "fix" => Command::Fix,
            "test_connection" => Command::TestConnection,
            _ => Command::Unknown,
        }
    }
}
