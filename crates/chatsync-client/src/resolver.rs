//! Conversation resolution.
//!
//! Get-or-create of the canonical conversation for a participant pair: a
//! lookup first, and a create only when the lookup reports absence. Concurrent
//! resolutions of the same pair are coalesced into one request chain, and all
//! waiters receive the id the server returned. Duplicate creation under races
//! between clients is the server's to deduplicate.

use std::collections::{HashMap, hash_map::Entry};

use chatsync_core::{ApiError, ConversationId, ParticipantPair};

use crate::api::{ApiRequest, ApiResponse};

/// Which request of the chain a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Lookup by pair.
    Lookup,
    /// Creation after an absent lookup.
    Create,
}

/// Result of feeding a completion into the resolver.
#[derive(Debug)]
pub enum Step<W> {
    /// No resolution was pending for this pair and stage.
    Ignored,
    /// The lookup found nothing; issue this create request.
    Create(ApiRequest),
    /// Resolution finished. Every waiter gets the same outcome.
    Done {
        /// Waiters registered since the chain started, in order.
        waiters: Vec<W>,
        /// Canonical id or the failure that ended the chain.
        result: Result<ConversationId, ApiError>,
    },
}

struct Pending<W> {
    stage: Stage,
    waiters: Vec<W>,
}

/// Coalescing get-or-create resolver.
///
/// `W` is whatever the caller needs to resume once the id is known.
pub struct Resolver<W> {
    pending: HashMap<ParticipantPair, Pending<W>>,
}

impl<W> Default for Resolver<W> {
    fn default() -> Self {
        Self { pending: HashMap::new() }
    }
}

impl<W> Resolver<W> {
    /// Create an idle resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` for `pair`.
    ///
    /// Returns the lookup request to issue, or `None` if a resolution for the
    /// pair is already in progress and the waiter joined it.
    pub fn resolve(&mut self, pair: ParticipantPair, waiter: W) -> Option<ApiRequest> {
        match self.pending.entry(pair) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.push(waiter);
                None
            },
            Entry::Vacant(entry) => {
                let request = ApiRequest::find_conversation(entry.key());
                entry.insert(Pending { stage: Stage::Lookup, waiters: vec![waiter] });
                Some(request)
            },
        }
    }

    /// Feed the outcome of the `stage` request for `pair`.
    pub fn complete(
        &mut self,
        pair: &ParticipantPair,
        stage: Stage,
        result: Result<ApiResponse, ApiError>,
    ) -> Step<W> {
        let Some(pending) = self.pending.get_mut(pair) else {
            return Step::Ignored;
        };
        if pending.stage != stage {
            return Step::Ignored;
        }

        let outcome = result.and_then(ApiResponse::into_conversation).and_then(|conversation| {
            match (stage, conversation.id.is_empty()) {
                (Stage::Lookup, true) => Err(ApiError::NotFound),
                (Stage::Create, true) => {
                    Err(ApiError::Decode("created conversation has no id".to_string()))
                },
                (_, false) => Ok(conversation.id),
            }
        });

        match outcome {
            Err(error) if stage == Stage::Lookup && error.is_absence() => {
                pending.stage = Stage::Create;
                Step::Create(ApiRequest::CreateConversation { participants: pair.clone() })
            },
            result => {
                let waiters = self.pending.remove(pair).map(|p| p.waiters).unwrap_or_default();
                Step::Done { waiters, result }
            },
        }
    }

    /// True if a resolution for `pair` is in progress.
    pub fn is_pending(&self, pair: &ParticipantPair) -> bool {
        self.pending.contains_key(pair)
    }

    /// Forget every pending resolution. Late completions become [`Step::Ignored`].
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use chatsync_core::Conversation;

    use super::*;

    fn pair() -> ParticipantPair {
        ParticipantPair::new("alice".into(), "bob".into())
    }

    fn found(id: &str) -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::Conversation(Conversation {
            id: id.into(),
            participant_ids: vec!["alice".into(), "bob".into()],
        }))
    }

    #[test]
    fn concurrent_resolutions_share_one_lookup() {
        let mut resolver = Resolver::new();

        assert!(resolver.resolve(pair(), 1).is_some());
        assert!(resolver.resolve(ParticipantPair::new("bob".into(), "alice".into()), 2).is_none());

        let Step::Done { waiters, result } = resolver.complete(&pair(), Stage::Lookup, found("c1"))
        else {
            panic!("expected resolution to finish");
        };
        assert_eq!(waiters, vec![1, 2]);
        assert_eq!(result, Ok("c1".into()));
        assert!(!resolver.is_pending(&pair()));
    }

    #[test]
    fn absent_lookup_falls_back_to_create() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());

        let step = resolver.complete(&pair(), Stage::Lookup, Err(ApiError::NotFound));
        assert!(matches!(step, Step::Create(ApiRequest::CreateConversation { .. })));

        let step = resolver.complete(&pair(), Stage::Create, found("c7"));
        assert!(matches!(step, Step::Done { result: Ok(ref id), .. } if id.as_str() == "c7"));
    }

    #[test]
    fn server_error_on_lookup_counts_as_absence() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());

        let err = ApiError::Server { status: 500, message: "no rows".into() };
        let step = resolver.complete(&pair(), Stage::Lookup, Err(err));

        assert!(matches!(step, Step::Create(_)));
    }

    #[test]
    fn lookup_with_empty_id_counts_as_absence() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());

        assert!(matches!(resolver.complete(&pair(), Stage::Lookup, found("")), Step::Create(_)));
    }

    #[test]
    fn network_failure_ends_the_chain() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());

        let step =
            resolver.complete(&pair(), Stage::Lookup, Err(ApiError::Transport("reset".into())));

        assert!(matches!(step, Step::Done { result: Err(ApiError::Transport(_)), .. }));
        assert!(!resolver.is_pending(&pair()));
    }

    #[test]
    fn create_failure_is_not_retried() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());
        resolver.complete(&pair(), Stage::Lookup, Err(ApiError::NotFound));

        let err = ApiError::Server { status: 503, message: String::new() };
        let step = resolver.complete(&pair(), Stage::Create, Err(err));

        assert!(matches!(step, Step::Done { result: Err(ApiError::Server { .. }), .. }));
    }

    #[test]
    fn completion_for_wrong_stage_is_ignored() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());

        assert!(matches!(resolver.complete(&pair(), Stage::Create, found("c1")), Step::Ignored));
        assert!(resolver.is_pending(&pair()));
    }

    #[test]
    fn cleared_resolver_ignores_late_completions() {
        let mut resolver = Resolver::new();
        resolver.resolve(pair(), ());
        resolver.clear();

        assert!(matches!(resolver.complete(&pair(), Stage::Lookup, found("c1")), Step::Ignored));
    }
}
