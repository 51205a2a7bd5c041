//! Completion estimates.
//!
//! Estimates are advisory and only ever grow. Setting an estimate of `T` on a
//! request raises its own estimate to at least `T`, its parent's to at least
//! `T + delay` (the stage boundary being crossed), and every further ancestor
//! to at least that same value. The walk stops at the first ancestor that is
//! already late enough.

use super::transition::Effect;
use super::{GraphError, RequestGraph};
use crate::request::{FileRequest, RequestId};
use crate::telemetry::TelemetryEvent;
use std::time::{Duration, Instant};

impl RequestGraph {
    /// Records that `id` is expected to finish at `at`.
    ///
    /// `stage_delay` is the extra time the parent's stage needs after this
    /// request finishes. [`StagePool::update_estimate`](crate::stage::StagePool::update_estimate)
    /// supplies the configured delay of its stage.
    pub fn set_estimated_completion(
        &self,
        id: RequestId,
        at: Instant,
        stage_delay: Duration,
    ) -> Result<(), GraphError> {
        let mut effects = Vec::new();
        {
            let mut arena = self.arena.lock();
            let node = arena.get_mut(id).ok_or(GraphError::StaleRequest(id))?;
            let raised_self = node.raise_estimate(at);
            if raised_self {
                mirror_estimate(node, at, &mut effects);
            }

            let bubbled = at.checked_add(stage_delay).unwrap_or(at);
            let mut ancestors_raised = 0;
            let mut current = node.parent();
            let max_hops = arena.live();
            while let Some(ancestor) = current.take() {
                if ancestors_raised >= max_hops {
                    break;
                }
                let Some(node) = arena.get_mut(ancestor) else {
                    break;
                };
                if !node.raise_estimate(bubbled) {
                    break;
                }
                mirror_estimate(node, bubbled, &mut effects);
                ancestors_raised += 1;
                current = node.parent();
            }

            if raised_self || ancestors_raised > 0 {
                effects.push(Effect::Telemetry(TelemetryEvent::EstimateUpdated {
                    request: id,
                    estimate: at,
                    ancestors_raised,
                }));
            }
        }
        self.dispatch(effects);
        Ok(())
    }
}

fn mirror_estimate(node: &FileRequest, at: Instant, effects: &mut Vec<Effect>) {
    if let Some(link) = node.payload().as_link() {
        effects.push(Effect::MirrorEstimate {
            request: link.request().clone(),
            at,
        });
    }
}
