//! Participants, sessions, teams and role assignment.

use chrono::Utc;
use itertools::Itertools;
use joke_market_allocation::{allocate, feasible_customer_counts};
use rand::{thread_rng, Rng as _};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::models::{Participant, ParticipantId, ParticipantStatus, Role, Team, TeamId};
use crate::store::Store;
use crate::Engine;

pub const MAX_NAME_LENGTH: usize = 40;
const SESSION_TOKEN_LENGTH: usize = 30;

/// A freshly issued session. The token is what clients present on every later
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedSession {
    pub participant: Participant,
    pub token: String,
}

// Distinguishes a missing field from an explicit `null`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Manual override of a participant's assignment. Omitted fields keep their
/// value, `null` clears role or team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Option<Role>>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub team_id: Option<Option<TeamId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ParticipantStatus>,
}

fn normalize_name(display_name: &str, what: &str) -> Result<String, EngineError> {
    let name = display_name.trim();
    if name.is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(EngineError::Validation(format!(
            "{what} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

fn session_token() -> String {
    thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl Store {
    fn participant_by_name(&self, name: &str) -> Option<&Participant> {
        let name = name.to_lowercase();
        self.participants
            .values()
            .find(|participant| participant.display_name.to_lowercase() == name)
    }

    fn create_participant(&mut self, display_name: String, role: Option<Role>) -> JoinedSession {
        let now = Utc::now();
        let id = ParticipantId(self.sequences.participants.next());
        let mut participant = Participant {
            id,
            display_name,
            status: ParticipantStatus::Waiting,
            role: None,
            team_id: None,
            joined_at: now,
            assigned_at: None,
        };
        if let Some(role) = role {
            participant.assign(role, None, now);
        }
        self.participants.insert(id, participant.clone());
        JoinedSession {
            participant,
            token: self.issue_session(id),
        }
    }

    fn issue_session(&mut self, id: ParticipantId) -> String {
        let token = session_token();
        self.sessions.insert(token.clone(), id);
        token
    }

    /// Everybody but the instructors, in join order.
    pub(crate) fn eligible_participants(&self) -> Vec<ParticipantId> {
        self.participants
            .values()
            .filter(|participant| !participant.is_instructor())
            .sorted_by_key(|participant| (participant.joined_at, participant.id))
            .map(|participant| participant.id)
            .collect()
    }
}

impl Engine {
    pub fn join(&self, display_name: &str) -> Result<JoinedSession, EngineError> {
        let name = normalize_name(display_name, "display name")?;
        self.mutate("join", |store| {
            if store.participant_by_name(&name).is_some() {
                return Err(EngineError::NameTaken(name));
            }
            let joined = store.create_participant(name, None);
            info!(participant = %joined.participant.id, name = %joined.participant.display_name, "joined");
            Ok(joined)
        })
    }

    /// Logs in as instructor, re-using an existing instructor of that name.
    pub fn instructor_login(
        &self,
        display_name: &str,
        password: &str,
    ) -> Result<JoinedSession, EngineError> {
        let name = normalize_name(display_name, "display name")?;
        if password != self.settings.instructor_password {
            return Err(EngineError::Forbidden("someone with the instructor password"));
        }
        self.mutate("instructor_login", |store| {
            if let Some(existing) = store.participant_by_name(&name) {
                if !existing.is_instructor() {
                    return Err(EngineError::NameTaken(name));
                }
                let participant = existing.clone();
                // one live session per instructor
                store.sessions.retain(|_, id| *id != participant.id);
                let token = store.issue_session(participant.id);
                info!(participant = %participant.id, "instructor logged in again");
                return Ok(JoinedSession { participant, token });
            }
            let joined = store.create_participant(name, Some(Role::Instructor));
            info!(participant = %joined.participant.id, "instructor logged in");
            Ok(joined)
        })
    }

    /// All participants ordered by id.
    #[must_use]
    pub fn roster(&self) -> Vec<Participant> {
        self.read().participants.values().cloned().collect()
    }

    #[must_use]
    pub fn teams(&self) -> Vec<Team> {
        self.read().teams.values().cloned().collect()
    }

    pub fn participant(&self, id: ParticipantId) -> Result<Participant, EngineError> {
        self.read().participant(id).cloned()
    }

    /// Customer counts the instructor can choose for the current participants.
    #[must_use]
    pub fn feasible_customer_counts(&self) -> Vec<u32> {
        let eligible = self.read().eligible_participants().len();
        feasible_customer_counts(u32::try_from(eligible).unwrap_or(u32::MAX))
    }

    /// Turns every non-instructor into a customer or a member of one of
    /// `team_count` producer / quality-control pairs, in join order.
    pub fn auto_assign(
        &self,
        actor: ParticipantId,
        customer_count: u32,
        team_count: u32,
    ) -> Result<Vec<Participant>, EngineError> {
        self.mutate("auto_assign", |store| {
            store.require_instructor(actor)?;
            let allocation = allocate(store.eligible_participants(), customer_count, team_count)?;
            let now = Utc::now();

            for (index, pair) in (1..=team_count).zip(allocation.teams) {
                let team_id = TeamId(index);
                store.ensure_team(team_id);
                for (id, role) in [
                    (pair.producer, Role::Producer),
                    (pair.quality_control, Role::QualityControl),
                ] {
                    if let Some(participant) = store.participants.get_mut(&id) {
                        participant.assign(role, Some(team_id), now);
                    }
                }
            }
            for id in allocation.customers {
                if let Some(participant) = store.participants.get_mut(&id) {
                    participant.assign(Role::Customer, None, now);
                }
            }

            info!(customer_count, team_count, "auto assigned participants");
            Ok(store.participants.values().cloned().collect())
        })
    }

    pub fn patch_assignment(
        &self,
        actor: ParticipantId,
        participant_id: ParticipantId,
        patch: AssignmentPatch,
    ) -> Result<Participant, EngineError> {
        self.mutate("patch_assignment", |store| {
            store.require_instructor(actor)?;
            let current = store.participant(participant_id)?;
            if current.is_instructor() {
                return Err(EngineError::InstructorProtected(participant_id));
            }

            let role = patch.role.unwrap_or(current.role);
            let team_id = patch.team_id.unwrap_or(current.team_id);
            if role == Some(Role::Instructor) {
                return Err(EngineError::Validation(
                    "nobody can be made an instructor".to_owned(),
                ));
            }
            let role = match patch.status {
                Some(ParticipantStatus::Waiting) => None,
                Some(ParticipantStatus::Assigned) if role.is_none() => {
                    return Err(EngineError::Validation(
                        "an assigned participant needs a role".to_owned(),
                    ));
                }
                _ => role,
            };
            if let (Some(role), Some(team_id)) = (role, team_id) {
                if role.is_team_role() {
                    store.team(team_id)?;
                }
            }

            let now = Utc::now();
            let participant = store
                .participants
                .get_mut(&participant_id)
                .ok_or(EngineError::ParticipantNotFound(participant_id))?;
            match role {
                Some(role) => participant.assign(role, team_id, now),
                None => participant.unassign(),
            }
            info!(
                participant = %participant_id,
                role = ?participant.role,
                team = ?participant.team_id,
                "patched assignment"
            );
            Ok(participant.clone())
        })
    }

    pub fn rename_team(
        &self,
        actor: ParticipantId,
        team_id: TeamId,
        name: &str,
    ) -> Result<Team, EngineError> {
        let name = normalize_name(name, "team name")?;
        self.mutate("rename_team", |store| {
            store.require_instructor(actor)?;
            let team = store
                .teams
                .get_mut(&team_id)
                .ok_or(EngineError::TeamNotFound(team_id))?;
            team.name = name;
            info!(team = %team_id, name = %team.name, "renamed team");
            Ok(team.clone())
        })
    }

    /// Removes a participant and their sessions. Batches and purchases they
    /// caused stay as they are.
    pub fn remove_participant(
        &self,
        actor: ParticipantId,
        participant_id: ParticipantId,
    ) -> Result<Participant, EngineError> {
        self.mutate("remove_participant", |store| {
            store.require_instructor(actor)?;
            if store.participant(participant_id)?.is_instructor() {
                return Err(EngineError::InstructorProtected(participant_id));
            }
            let removed = store
                .participants
                .remove(&participant_id)
                .ok_or(EngineError::ParticipantNotFound(participant_id))?;
            store.sessions.retain(|_, id| *id != participant_id);
            info!(participant = %participant_id, "removed participant");
            Ok(removed)
        })
    }

    /// Wipes the whole session, instructors included, back to the default
    /// teams.
    pub fn reset(&self, actor: ParticipantId) -> Result<(), EngineError> {
        self.mutate("reset", |store| {
            store.require_instructor(actor)?;
            let version = store.version;
            *store = Store::with_default_teams(self.settings.default_team_count);
            store.version = version;
            info!("reset session");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::game;

    fn instructor(engine: &Engine) -> ParticipantId {
        engine
            .instructor_login("Frizzle", "instructor")
            .unwrap()
            .participant
            .id
    }

    #[test]
    fn names_are_unique_case_insensitively() {
        let engine = Engine::default();
        let joined = engine.join("  Ada ").unwrap();
        assert_eq!(joined.participant.display_name, "Ada");
        assert_eq!(joined.participant.status, ParticipantStatus::Waiting);
        assert_eq!(joined.participant.role, None);
        assert_eq!(joined.token.len(), SESSION_TOKEN_LENGTH);
        assert_eq!(engine.resolve_session(&joined.token), Ok(joined.participant.id));

        assert_eq!(engine.join("aDA"), Err(EngineError::NameTaken("aDA".to_owned())));
        assert!(matches!(engine.join("   "), Err(EngineError::Validation(_))));
        assert!(matches!(
            engine.join(&"x".repeat(MAX_NAME_LENGTH + 1)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn instructor_login_checks_password_and_reuses_identity() {
        let engine = Engine::default();
        assert_eq!(
            engine.instructor_login("Frizzle", "wrong"),
            Err(EngineError::Forbidden("someone with the instructor password"))
        );
        let first = engine.instructor_login("Frizzle", "instructor").unwrap();
        let second = engine.instructor_login("frizzle", "instructor").unwrap();
        assert_eq!(first.participant.id, second.participant.id);
        assert_ne!(first.token, second.token);
        assert_eq!(engine.resolve_session(&first.token), Err(EngineError::SessionLost));
        assert_eq!(engine.resolve_session(&second.token), Ok(second.participant.id));
        assert_eq!(first.participant.role, Some(Role::Instructor));
        assert_eq!(first.participant.status, ParticipantStatus::Assigned);

        engine.join("Ada").unwrap();
        assert_eq!(
            engine.instructor_login("ada", "instructor"),
            Err(EngineError::NameTaken("ada".to_owned()))
        );
    }

    #[test]
    fn auto_assign_partitions_in_join_order() {
        let game = game(5, 2);
        let roster = game.engine.roster();
        let find = |id| roster.iter().find(|p| p.id == id).unwrap();

        for &customer in &game.customers {
            assert_eq!(find(customer).role, Some(Role::Customer));
            assert_eq!(find(customer).team_id, None);
            assert_eq!(find(customer).status, ParticipantStatus::Assigned);
        }
        for (index, (&producer, &grader)) in game.producers.iter().zip(&game.graders).enumerate()
        {
            let team = Some(TeamId(u32::try_from(index).unwrap() + 1));
            assert_eq!(find(producer).role, Some(Role::Producer));
            assert_eq!(find(producer).team_id, team);
            assert_eq!(find(grader).role, Some(Role::QualityControl));
            assert_eq!(find(grader).team_id, team);
        }
        assert_eq!(find(game.instructor).role, Some(Role::Instructor));
    }

    #[test]
    fn auto_assign_checks_the_arithmetic() {
        let engine = Engine::default();
        let instructor = instructor(&engine);
        for name in ["A", "B", "C", "D", "E", "F", "G", "H"] {
            engine.join(name).unwrap();
        }
        assert_eq!(engine.feasible_customer_counts(), vec![2, 4, 6]);
        assert!(matches!(
            engine.auto_assign(instructor, 3, 2),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.auto_assign(instructor, 0, 4),
            Err(EngineError::Validation(_))
        ));
        let version = engine.version();
        assert!(engine.auto_assign(instructor, 8, 1).is_err());
        assert_eq!(engine.version(), version);

        engine.auto_assign(instructor, 4, 2).unwrap();
        let customers = engine
            .roster()
            .iter()
            .filter(|p| p.has_role(Role::Customer))
            .count();
        assert_eq!(customers, 4);
    }

    #[test]
    fn auto_assign_creates_missing_teams() {
        let engine = Engine::default();
        let instructor = instructor(&engine);
        for index in 0..14 {
            engine.join(&format!("Player {index}")).unwrap();
        }
        engine.auto_assign(instructor, 2, 6).unwrap();
        assert_eq!(engine.teams().len(), 6);
        assert_eq!(engine.teams()[5].name, "Team 6");
    }

    #[test]
    fn patch_keeps_invariants() {
        let game = game(5, 2);
        let engine = &game.engine;
        let customer = game.customers[0];

        let patched = engine
            .patch_assignment(
                game.instructor,
                customer,
                AssignmentPatch {
                    role: Some(Some(Role::Producer)),
                    team_id: Some(Some(TeamId(2))),
                    status: None,
                },
            )
            .unwrap();
        assert_eq!(patched.role, Some(Role::Producer));
        assert_eq!(patched.team_id, Some(TeamId(2)));

        let toggled = engine
            .patch_assignment(
                game.instructor,
                customer,
                AssignmentPatch {
                    role: Some(Some(Role::QualityControl)),
                    ..AssignmentPatch::default()
                },
            )
            .unwrap();
        assert_eq!(toggled.role, Some(Role::QualityControl));
        assert_eq!(toggled.team_id, Some(TeamId(2)));

        let waiting = engine
            .patch_assignment(
                game.instructor,
                customer,
                AssignmentPatch {
                    status: Some(ParticipantStatus::Waiting),
                    ..AssignmentPatch::default()
                },
            )
            .unwrap();
        assert_eq!(waiting.status, ParticipantStatus::Waiting);
        assert_eq!(waiting.role, None);
        assert_eq!(waiting.team_id, None);

        let customer_again = engine
            .patch_assignment(
                game.instructor,
                customer,
                AssignmentPatch {
                    role: Some(Some(Role::Customer)),
                    team_id: Some(Some(TeamId(1))),
                    status: Some(ParticipantStatus::Assigned),
                },
            )
            .unwrap();
        assert_eq!(customer_again.team_id, None);

        let cleared = engine
            .patch_assignment(
                game.instructor,
                customer,
                AssignmentPatch {
                    role: Some(None),
                    ..AssignmentPatch::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.status, ParticipantStatus::Waiting);
    }

    #[test]
    fn patch_rejections() {
        let game = game(5, 2);
        let engine = &game.engine;
        assert_eq!(
            engine.patch_assignment(game.instructor, game.instructor, AssignmentPatch::default()),
            Err(EngineError::InstructorProtected(game.instructor))
        );
        assert!(matches!(
            engine.patch_assignment(
                game.instructor,
                game.customers[0],
                AssignmentPatch {
                    role: Some(Some(Role::Instructor)),
                    ..AssignmentPatch::default()
                }
            ),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(
            engine.patch_assignment(
                game.instructor,
                game.customers[0],
                AssignmentPatch {
                    role: Some(Some(Role::Producer)),
                    team_id: Some(Some(TeamId(99))),
                    status: None,
                }
            ),
            Err(EngineError::TeamNotFound(TeamId(99)))
        );
        assert_eq!(
            engine.patch_assignment(game.customers[1], game.customers[0], AssignmentPatch::default()),
            Err(EngineError::Forbidden("the instructor"))
        );
    }

    #[test]
    fn patch_payload_distinguishes_null_from_missing() {
        let patch: AssignmentPatch = serde_json::from_str(r#"{"role":null}"#).unwrap();
        assert_eq!(patch.role, Some(None));
        assert_eq!(patch.team_id, None);
        let patch: AssignmentPatch =
            serde_json::from_str(r#"{"role":"QUALITY_CONTROL","team_id":3}"#).unwrap();
        assert_eq!(patch.role, Some(Some(Role::QualityControl)));
        assert_eq!(patch.team_id, Some(Some(TeamId(3))));
    }

    #[test]
    fn removal_invalidates_the_session_but_not_instructors() {
        let engine = Engine::default();
        let instructor = instructor(&engine);
        let joined = engine.join("Ada").unwrap();
        assert_eq!(
            engine.remove_participant(instructor, instructor),
            Err(EngineError::InstructorProtected(instructor))
        );
        engine
            .remove_participant(instructor, joined.participant.id)
            .unwrap();
        assert_eq!(
            engine.resolve_session(&joined.token),
            Err(EngineError::SessionLost)
        );
        assert_eq!(
            engine.remove_participant(instructor, joined.participant.id),
            Err(EngineError::ParticipantNotFound(joined.participant.id))
        );
        // the name is free again
        engine.join("ada").unwrap();
    }

    #[test]
    fn rename_team_is_cosmetic() {
        let game = game(5, 2);
        let team = game
            .engine
            .rename_team(game.instructor, TeamId(1), "The Punchliners")
            .unwrap();
        assert_eq!(team.name, "The Punchliners");
        game.engine
            .rename_team(game.instructor, TeamId(2), "The Punchliners")
            .unwrap();
        assert_eq!(
            game.engine.rename_team(game.instructor, TeamId(9), "x"),
            Err(EngineError::TeamNotFound(TeamId(9)))
        );
    }

    #[test]
    fn reset_wipes_everything_but_keeps_version_monotonic() {
        let game = game(5, 2);
        let before = game.engine.version();
        game.engine.reset(game.instructor).unwrap();
        assert!(game.engine.version() > before);
        assert!(game.engine.roster().is_empty());
        assert!(game.engine.list_rounds().is_empty());
        assert_eq!(
            game.engine.teams().len(),
            game.engine.settings().default_team_count as usize
        );
        assert_eq!(
            game.engine.reset(game.instructor),
            Err(EngineError::SessionLost)
        );
    }
}
