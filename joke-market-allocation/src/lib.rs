//! Splitting the participants of a session into customers and two-person
//! producer / quality-control teams.

use core::ops::RangeInclusive;

use itertools::Itertools;
use tracing::debug;

/// Customer counts an instructor may pick, before the participant count is
/// taken into account.
pub const CUSTOMER_RANGE: RangeInclusive<u32> = 2..=10;

/// Every team is one producer and one quality-control participant.
pub const TEAM_SIZE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair<T> {
    pub producer: T,
    pub quality_control: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation<T> {
    pub customers: Vec<T>,
    /// Index `i` becomes the `i`-th team.
    pub teams: Vec<Pair<T>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("customer count and team count must both be positive")]
    NonPositive,
    #[error(
        "{customers} customers and {teams} teams of two need {needed} participants but there are \
         {participants}"
    )]
    CountMismatch {
        customers: u32,
        teams: u32,
        needed: u64,
        participants: usize,
    },
}

/// Customer counts that leave at least one team and an even remainder.
///
/// For `participants = 12` this is `[2, 4, 6, 8, 10]`, for `participants = 3`
/// it is empty.
#[must_use]
pub fn feasible_customer_counts(participants: u32) -> Vec<u32> {
    CUSTOMER_RANGE
        .filter(|&customers| {
            participants >= TEAM_SIZE
                && customers <= participants - TEAM_SIZE
                && (participants - customers) % TEAM_SIZE == 0
        })
        .collect()
}

/// Deterministically partitions `participants` in the given order: the first
/// `customer_count` become customers, the rest are paired up in order with the
/// first of each pair producing and the second doing quality control.
pub fn allocate<T>(
    participants: impl IntoIterator<Item = T>,
    customer_count: u32,
    team_count: u32,
) -> Result<Allocation<T>, AllocationError> {
    if customer_count == 0 || team_count == 0 {
        return Err(AllocationError::NonPositive);
    }
    let participants = participants.into_iter().collect_vec();
    let needed = u64::from(customer_count) + u64::from(team_count) * u64::from(TEAM_SIZE);
    if u64::try_from(participants.len()).map_or(true, |len| len != needed) {
        return Err(AllocationError::CountMismatch {
            customers: customer_count,
            teams: team_count,
            needed,
            participants: participants.len(),
        });
    }

    let mut participants = participants.into_iter();
    let customers = participants
        .by_ref()
        .take(customer_count as usize)
        .collect_vec();
    let teams = participants
        .tuples()
        .map(|(producer, quality_control)| Pair {
            producer,
            quality_control,
        })
        .collect_vec();

    debug!(
        customers = customers.len(),
        teams = teams.len(),
        "allocated participants"
    );

    Ok(Allocation { customers, teams })
}
