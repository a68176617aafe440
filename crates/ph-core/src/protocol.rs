//! Message protocol between the in-page runtime and the extension shell
//!
//! Every message is a member of a closed, tagged union: requests carry an
//! `action` tag, events an `event` tag. The runtime dispatches requests with
//! a single `match` and answers with a typed `Response`. Types derive
//! `ts_rs::TS` so the shell's TypeScript stays in lockstep with the wire
//! format (`ph-cli types` regenerates the bindings).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Rule, RuleType};

// =============================================================================
// Requests (shell -> runtime)
// =============================================================================

/// A request from the popup/options shell to the in-page runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "camelCase")]
#[ts(export)]
pub enum Request {
    /// Summarize the page: active rules, preset availability, chips.
    GetPageInfo,
    /// Apply the built-in clean-page preset to this host.
    ApplyCleanPreset,
    /// Enter element-selection mode.
    StartTweak,
    /// Alias kept for older shells.
    StartTweakMode,
    /// Leave element-selection mode.
    ExitTweakMode,
    /// Ask the suggestion backend to turn free text into rules.
    #[serde(rename = "askAI")]
    AskAi { prompt: String },
    /// Undo the most recent rule from this session.
    Undo,
    /// Restore the page; `temporary` keeps the stored rules for next load.
    ResetSite { temporary: bool },
    /// Enable or disable automatic re-application for this host.
    ToggleAlwaysApply { enabled: bool },
    /// Persist the currently applied rules as this host's configuration.
    SaveCurrentConfig,
}

// =============================================================================
// Responses (runtime -> shell)
// =============================================================================

/// A chip summarizing one active rule for the shell UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Chip {
    pub label: String,
    pub selector: String,
    pub rule_type: RuleType,
    /// Elements currently affected by this rule.
    pub count: usize,
}

/// The typed answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[ts(export)]
pub enum Response {
    PageInfo {
        active: bool,
        preset_available: bool,
        always_apply: bool,
        chips: Vec<Chip>,
    },
    /// The request succeeded with nothing further to report.
    Ack,
    /// Rules were applied; `count` is the number of newly-affected elements.
    Applied { count: usize },
    /// Undo outcome; `rule` is None when the undo stack was empty.
    Undone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule: Option<Rule>,
    },
    /// Current configuration was persisted.
    Saved { rules: usize },
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// =============================================================================
// Events (runtime -> shell, unsolicited)
// =============================================================================

/// Notifications pushed outward by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "event", rename_all = "camelCase")]
#[ts(export)]
pub enum Event {
    /// Selection mode was entered or left.
    TweakModeActive { active: bool },
    /// A rule was applied to `count` newly-matched elements.
    ElementHidden { rule: Rule, count: usize },
    /// A rule was undone and removed.
    RuleUndone { rule: Rule },
    /// Non-fatal condition the shell may want to surface (for example a
    /// persistence failure while the in-page effect stayed applied).
    StatusMessage { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rule;

    #[test]
    fn test_request_action_tags() {
        let cases = [
            (Request::GetPageInfo, "getPageInfo"),
            (Request::ApplyCleanPreset, "applyCleanPreset"),
            (Request::StartTweak, "startTweak"),
            (Request::StartTweakMode, "startTweakMode"),
            (Request::ExitTweakMode, "exitTweakMode"),
            (Request::Undo, "undo"),
            (Request::SaveCurrentConfig, "saveCurrentConfig"),
        ];
        for (req, tag) in cases {
            let json = serde_json::to_value(&req).unwrap();
            assert_eq!(json["action"], tag);
        }
    }

    #[test]
    fn test_request_payloads_round_trip() {
        let req: Request =
            serde_json::from_str(r#"{"action":"askAI","prompt":"hide the sidebar"}"#).unwrap();
        assert_eq!(
            req,
            Request::AskAi {
                prompt: "hide the sidebar".to_string()
            }
        );

        let req: Request =
            serde_json::from_str(r#"{"action":"resetSite","temporary":true}"#).unwrap();
        assert_eq!(req, Request::ResetSite { temporary: true });

        let req: Request =
            serde_json::from_str(r#"{"action":"toggleAlwaysApply","enabled":false}"#).unwrap();
        assert_eq!(req, Request::ToggleAlwaysApply { enabled: false });
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"selfDestruct"}"#).is_err());
    }

    #[test]
    fn test_event_tags() {
        let event = Event::ElementHidden {
            rule: Rule::hide("#secondary", "sidebar"),
            count: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "elementHidden");
        assert_eq!(json["rule"]["selector"], "#secondary");
        assert_eq!(json["count"], 1);
    }

    #[test]
    fn test_response_round_trip() {
        let resp = Response::PageInfo {
            active: true,
            preset_available: true,
            always_apply: false,
            chips: vec![Chip {
                label: "sidebar".to_string(),
                selector: "#secondary".to_string(),
                rule_type: RuleType::Hide,
                count: 1,
            }],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
