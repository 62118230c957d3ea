use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, EnumString, IntoEnumIterator};

/// A single status condition, in the format shared by all Knative resources.
///
/// The condition type is generic, so that resources whose condition types are not fully known
/// (like the [`ServerlessService`](crate::crd::serverless_service::ServerlessService)) can use
/// plain strings.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition<T = ConditionType> {
    /// Type of the condition.
    #[serde(rename = "type")]
    pub type_: T,

    /// Status of the condition, one of True, False, Unknown.
    pub status: ConditionStatus,

    /// Last time the condition transitioned from one status to another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    /// The reason for the condition's last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// A human readable message indicating details about the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The conditions of a PodAutoscaler.
///
/// [`ConditionType::Ready`] is never set directly, it summarizes all other conditions.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    EnumCount,
    EnumIter,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum ConditionType {
    #[default]
    Ready,

    /// The revision is considered active, i.e. the scaler is in charge of its replicas.
    Active,

    /// The scale target reached its initial scale at least once.
    ScaleTargetInitialized,

    /// The routing shim (ServerlessService) in front of the revision is ready.
    #[serde(rename = "SKSReady")]
    SksReady,
}

impl ConditionType {
    /// Whether this condition contributes to [`ConditionType::Ready`].
    pub fn is_dependent(self) -> bool {
        self != Self::Ready
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    EnumString,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
    strum::Display,
)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Keeps at most one condition per [`ConditionType`] and derives the `Ready` condition.
#[derive(Clone, Debug)]
pub struct ConditionSet {
    // Every type has a fixed position, which keeps the order stable and rules out duplicates.
    conditions: Vec<Option<Condition>>,
}

impl Default for ConditionSet {
    fn default() -> Self {
        Self {
            conditions: vec![None; ConditionType::COUNT],
        }
    }
}

impl ConditionSet {
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions[type_ as usize].as_ref()
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_)
            .is_some_and(|condition| condition.status == ConditionStatus::True)
    }

    /// Sets every condition which is not set yet to `Unknown`.
    pub fn initialize(&mut self) {
        for type_ in ConditionType::iter() {
            if self.get(type_).is_none() {
                self.put(Condition {
                    type_,
                    last_transition_time: Some(now()),
                    ..Condition::default()
                });
            }
        }
    }

    /// Sets a condition and recomputes `Ready`.
    ///
    /// The transition time only moves if the status actually changes.
    pub fn mark(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        self.put(Condition {
            type_,
            status,
            last_transition_time: None,
            reason,
            message,
        });

        if type_.is_dependent() {
            self.recompute_ready();
        }
    }

    fn put(&mut self, mut condition: Condition) {
        let slot = &mut self.conditions[condition.type_ as usize];

        condition.last_transition_time = match slot {
            Some(old) if old.status == condition.status => old
                .last_transition_time
                .clone()
                .or(condition.last_transition_time),
            _ => condition.last_transition_time.or_else(|| Some(now())),
        };
        *slot = Some(condition);
    }

    /// `Ready` is `False` if any dependent is `False`, `Unknown` if any dependent is `Unknown` (or
    /// missing) and `True` otherwise. Reason and message are taken from the first unhappy
    /// dependent.
    fn recompute_ready(&mut self) {
        let dependents = || ConditionType::iter().filter(|type_| type_.is_dependent());

        let unhappy = dependents()
            .find(|type_| {
                self.get(*type_)
                    .is_some_and(|condition| condition.status == ConditionStatus::False)
            })
            .or_else(|| dependents().find(|type_| !self.is_true(*type_)));

        let (status, reason, message) = match unhappy.map(|type_| self.get(type_)) {
            None => (ConditionStatus::True, None, None),
            Some(None) => (ConditionStatus::Unknown, None, None),
            Some(Some(condition)) => (
                condition.status,
                condition.reason.clone(),
                condition.message.clone(),
            ),
        };

        self.put(Condition {
            type_: ConditionType::Ready,
            status,
            last_transition_time: None,
            reason,
            message,
        });
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(value: Vec<Condition>) -> Self {
        let mut set = Self::default();
        for condition in value {
            let index = condition.type_ as usize;
            set.conditions[index] = Some(condition);
        }
        set
    }
}

impl From<ConditionSet> for Vec<Condition> {
    fn from(value: ConditionSet) -> Self {
        value.conditions.into_iter().flatten().collect()
    }
}

fn now() -> Time {
    Time(Timestamp::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(set: &mut ConditionSet, type_: ConditionType, status: ConditionStatus) {
        set.mark(type_, status, Some(format!("{type_:?}{status}")), None);
    }

    #[test]
    fn initialize_sets_everything_unknown() {
        let mut set = ConditionSet::default();
        set.initialize();

        let conditions: Vec<Condition> = set.into();
        assert_eq!(conditions.len(), ConditionType::COUNT);
        assert!(
            conditions
                .iter()
                .all(|condition| condition.status == ConditionStatus::Unknown)
        );
        assert_eq!(conditions[0].type_, ConditionType::Ready);
    }

    #[test]
    fn ready_once_all_dependents_are_true() {
        let mut set = ConditionSet::default();
        set.initialize();

        mark(&mut set, ConditionType::Active, ConditionStatus::True);
        mark(&mut set, ConditionType::SksReady, ConditionStatus::True);
        assert_eq!(
            set.get(ConditionType::Ready).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );

        mark(&mut set, ConditionType::ScaleTargetInitialized, ConditionStatus::True);
        assert!(set.is_true(ConditionType::Ready));
    }

    #[test]
    fn false_dependent_wins_over_unknown() {
        let mut set = ConditionSet::default();
        set.initialize();

        mark(&mut set, ConditionType::SksReady, ConditionStatus::False);

        let ready = set.get(ConditionType::Ready).expect("ready is set");
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason.as_deref(), Some("SksReadyFalse"));
    }

    #[test]
    fn missing_dependents_are_unknown() {
        let mut set = ConditionSet::default();
        mark(&mut set, ConditionType::Active, ConditionStatus::True);

        let ready = set.get(ConditionType::Ready).expect("ready is set");
        assert_eq!(ready.status, ConditionStatus::Unknown);
    }

    #[test]
    fn transition_time_only_moves_on_status_change() {
        let earlier = Time(Timestamp::UNIX_EPOCH);
        let mut set = ConditionSet::from(vec![Condition {
            type_: ConditionType::Active,
            status: ConditionStatus::True,
            last_transition_time: Some(earlier.clone()),
            reason: None,
            message: None,
        }]);

        mark(&mut set, ConditionType::Active, ConditionStatus::True);
        assert_eq!(
            set.get(ConditionType::Active)
                .and_then(|c| c.last_transition_time.clone()),
            Some(earlier.clone())
        );

        mark(&mut set, ConditionType::Active, ConditionStatus::False);
        assert_ne!(
            set.get(ConditionType::Active)
                .and_then(|c| c.last_transition_time.clone()),
            Some(earlier)
        );
    }

    #[test]
    fn serializes_knative_names() {
        let condition = Condition {
            type_: ConditionType::SksReady,
            status: ConditionStatus::True,
            ..Condition::default()
        };

        assert_eq!(
            serde_json::to_value(condition).expect("serializable"),
            serde_json::json!({"type": "SKSReady", "status": "True"})
        );
    }
}
