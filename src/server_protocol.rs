use serde_json::Value;

use crate::types::Team;

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
        reconnect_token: Option<String>,
    },
    Ready {
        ready: bool,
    },
    SwitchTeam {
        team: Team,
    },
    ChooseCharacter {
        kind: i64,
    },
    AddBot {
        team: Team,
    },
    RemoveBot {
        team: Team,
        index: i64,
    },
    RestartLobby,
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let reconnect_token = match object.get("reconnectToken") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Hello {
                name,
                reconnect_token,
            })
        }
        "ready" => {
            let ready = match object.get("ready") {
                None => true,
                Some(value) => value.as_bool()?,
            };
            Some(ParsedClientMessage::Ready { ready })
        }
        "switch_team" => {
            let team = parse_playable_team(object.get("team"))?;
            Some(ParsedClientMessage::SwitchTeam { team })
        }
        "choose_character" => {
            let kind = parse_optional_i64(object.get("kind"))??;
            Some(ParsedClientMessage::ChooseCharacter { kind })
        }
        "add_bot" => {
            let team = parse_playable_team(object.get("team"))?;
            Some(ParsedClientMessage::AddBot { team })
        }
        "remove_bot" => {
            let team = parse_playable_team(object.get("team"))?;
            let index = parse_optional_i64(object.get("index"))??;
            Some(ParsedClientMessage::RemoveBot { team, index })
        }
        "restart_lobby" => Some(ParsedClientMessage::RestartLobby),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_playable_team(value: Option<&Value>) -> Option<Team> {
    Team::parse(value?.as_str()?).filter(|team| team.is_playable())
}

pub fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored < i64::MIN as f64 || floored > i64::MAX as f64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
