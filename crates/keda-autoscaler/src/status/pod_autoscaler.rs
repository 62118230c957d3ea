use super::condition::{ConditionSet, ConditionStatus, ConditionType};
use crate::crd::pod_autoscaler::PodAutoscalerStatus;

pub const NOT_OWNED_REASON: &str = "NotOwned";
pub const FAILED_CREATE_REASON: &str = "FailedCreate";
pub const INVALID_SCALED_OBJECT_REASON: &str = "InvalidScaledObject";
pub const SKS_NOT_READY_REASON: &str = "NotReady";

impl PodAutoscalerStatus {
    fn update_conditions(&mut self, update: impl FnOnce(&mut ConditionSet)) {
        let mut set = ConditionSet::from(std::mem::take(&mut self.conditions));
        update(&mut set);
        self.conditions = set.into();
    }

    fn mark(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason_and_message: Option<(&str, String)>,
    ) {
        let (reason, message) = reason_and_message
            .map(|(reason, message)| (reason.to_owned(), message))
            .unzip();
        self.update_conditions(|set| set.mark(type_, status, reason, message));
    }

    fn is_true(&self, type_: ConditionType) -> bool {
        self.conditions
            .iter()
            .any(|condition| condition.type_ == type_ && condition.status == ConditionStatus::True)
    }

    /// Sets all conditions which are not set yet to `Unknown`.
    pub fn initialize_conditions(&mut self) {
        self.update_conditions(ConditionSet::initialize);
    }

    pub fn is_ready(&self) -> bool {
        self.is_true(ConditionType::Ready)
    }

    pub fn is_active(&self) -> bool {
        self.is_true(ConditionType::Active)
    }

    pub fn is_scale_target_initialized(&self) -> bool {
        self.is_true(ConditionType::ScaleTargetInitialized)
    }

    pub fn mark_active(&mut self) {
        self.mark(ConditionType::Active, ConditionStatus::True, None);
    }

    pub fn mark_inactive(&mut self, reason: &str, message: String) {
        self.mark(
            ConditionType::Active,
            ConditionStatus::False,
            Some((reason, message)),
        );
    }

    /// A resource the PodAutoscaler would manage exists, but is controlled by somebody else.
    pub fn mark_resource_not_owned(&mut self, kind: &str, name: &str) {
        self.mark_inactive(
            NOT_OWNED_REASON,
            format!("There is an existing {kind} {name:?} that we do not own."),
        );
    }

    pub fn mark_resource_failed_creation(&mut self, kind: &str, name: &str) {
        self.mark_inactive(
            FAILED_CREATE_REASON,
            format!("Failed to create {kind} {name:?}."),
        );
    }

    pub fn mark_scale_target_initialized(&mut self) {
        self.mark(
            ConditionType::ScaleTargetInitialized,
            ConditionStatus::True,
            None,
        );
    }

    pub fn mark_sks_ready(&mut self) {
        self.mark(ConditionType::SksReady, ConditionStatus::True, None);
    }

    pub fn mark_sks_not_ready(&mut self, message: impl Into<String>) {
        self.mark(
            ConditionType::SksReady,
            ConditionStatus::Unknown,
            Some((SKS_NOT_READY_REASON, message.into())),
        );
    }
}
