// core/collision.rs
//
// Collision listener registries of one world. Contact callbacks from the
// physics step are canonicalized here and turned into dispatch records;
// the records cross to the frame thread through the world's channel and
// are executed there.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::api::types::{ActorId, BodyId, ListenerId};

/// Whether a contact started or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    Begin,
    End,
}

/// Two distinct bodies ordered by identity: `lower < higher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    pub lower: BodyId,
    pub higher: BodyId,
}

impl CanonicalPair {
    /// `None` when both sides are the same body.
    pub fn new(a: BodyId, b: BodyId) -> Option<Self> {
        match a.cmp(&b) {
            Ordering::Less => Some(Self { lower: a, higher: b }),
            Ordering::Greater => Some(Self { lower: b, higher: a }),
            Ordering::Equal => None,
        }
    }

    pub fn involves(&self, body: BodyId) -> bool {
        self.lower == body || self.higher == body
    }
}

/// One listener invocation, produced on a step worker and executed on the
/// frame thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionDispatch {
    pub listener: ListenerId,
    /// Actor that registered the listener.
    pub owner: ActorId,
    /// Actor passed to the listener as the collision partner.
    pub collider: ActorId,
    pub phase: ContactPhase,
}

#[derive(Debug, Clone, Copy)]
struct PairwiseEntry {
    listener: ListenerId,
    partner: BodyId,
    owner: ActorId,
    collider: ActorId,
}

#[derive(Debug, Clone, Copy)]
struct GeneralEntry {
    listener: ListenerId,
    owner: ActorId,
}

/// Listener registered on a body that was just destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgedListener {
    pub owner: ActorId,
    pub listener: ListenerId,
}

/// Pairwise and per-body registries plus the set of touching body pairs.
#[derive(Debug, Default)]
pub struct CollisionRegistry {
    /// Keyed by the canonically lower body of the pair.
    pairwise: HashMap<BodyId, Vec<PairwiseEntry>>,
    general: HashMap<BodyId, Vec<GeneralEntry>>,
    /// Active contact count per pair. Bodies with several fixtures report
    /// one begin/end per fixture pair; only the 0 -> 1 and 1 -> 0
    /// transitions reach listeners.
    contacts: HashMap<CanonicalPair, u32>,
}

impl CollisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` (owned by `owner`) for contacts between `owner`'s
    /// body and `collider`'s body. Returns `false` if both are one body.
    pub fn register_pairwise(
        &mut self,
        listener: ListenerId,
        (owner_body, owner): (BodyId, ActorId),
        (collider_body, collider): (BodyId, ActorId),
    ) -> bool {
        let Some(pair) = CanonicalPair::new(owner_body, collider_body) else {
            return false;
        };
        self.pairwise.entry(pair.lower).or_default().push(PairwiseEntry {
            listener,
            partner: pair.higher,
            owner,
            collider,
        });
        true
    }

    /// Register `listener` for every contact involving `body`.
    pub fn register_general(&mut self, listener: ListenerId, body: BodyId, owner: ActorId) {
        self.general
            .entry(body)
            .or_default()
            .push(GeneralEntry { listener, owner });
    }

    /// Remove one listener wherever it is registered.
    pub fn unregister(&mut self, listener: ListenerId) -> bool {
        let mut removed = false;
        for entries in self.pairwise.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.listener != listener);
            removed |= entries.len() != before;
        }
        for entries in self.general.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.listener != listener);
            removed |= entries.len() != before;
        }
        self.pairwise.retain(|_, entries| !entries.is_empty());
        self.general.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Drop every entry keyed by or pointing at `body`, and forget its
    /// contacts. Returns the listeners that went away.
    pub fn purge_body(&mut self, body: BodyId) -> Vec<PurgedListener> {
        let mut purged = Vec::new();

        if let Some(entries) = self.pairwise.remove(&body) {
            purged.extend(entries.iter().map(|e| PurgedListener {
                owner: e.owner,
                listener: e.listener,
            }));
        }
        for entries in self.pairwise.values_mut() {
            entries.retain(|e| {
                if e.partner == body {
                    purged.push(PurgedListener {
                        owner: e.owner,
                        listener: e.listener,
                    });
                    false
                } else {
                    true
                }
            });
        }
        self.pairwise.retain(|_, entries| !entries.is_empty());

        if let Some(entries) = self.general.remove(&body) {
            purged.extend(entries.iter().map(|e| PurgedListener {
                owner: e.owner,
                listener: e.listener,
            }));
        }

        self.contacts.retain(|pair, _| !pair.involves(body));
        purged
    }

    /// Number of registered listeners, pairwise and general.
    pub fn len(&self) -> usize {
        self.pairwise.values().map(Vec::len).sum::<usize>()
            + self.general.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle one raw contact callback between the bodies `x` and `y`.
    /// Each side carries its owning actor.
    pub fn on_contact(
        &mut self,
        (x, x_actor): (BodyId, ActorId),
        (y, y_actor): (BodyId, ActorId),
        phase: ContactPhase,
    ) -> Vec<CollisionDispatch> {
        let Some(pair) = CanonicalPair::new(x, y) else {
            log::warn!("ignoring contact of body {x:?} with itself");
            return Vec::new();
        };
        if !self.track(pair, phase) {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(entries) = self.pairwise.get(&pair.lower) {
            out.extend(
                entries
                    .iter()
                    .filter(|e| e.partner == pair.higher)
                    .map(|e| CollisionDispatch {
                        listener: e.listener,
                        owner: e.owner,
                        collider: e.collider,
                        phase,
                    }),
            );
        }
        for (body, partner) in [(x, y_actor), (y, x_actor)] {
            if let Some(entries) = self.general.get(&body) {
                out.extend(entries.iter().map(|e| CollisionDispatch {
                    listener: e.listener,
                    owner: e.owner,
                    collider: partner,
                    phase,
                }));
            }
        }
        out
    }

    /// Update the contact count; `true` on the transitions listeners see.
    fn track(&mut self, pair: CanonicalPair, phase: ContactPhase) -> bool {
        match phase {
            ContactPhase::Begin => {
                let count = self.contacts.entry(pair).or_insert(0);
                *count += 1;
                *count == 1
            }
            ContactPhase::End => match self.contacts.get_mut(&pair) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    self.contacts.remove(&pair);
                    true
                }
                // End without a matching begin, e.g. after a purge.
                None => false,
            },
        }
    }
}
