//! Threshold notifications
//!
//! Listeners are called synchronously, in order, from inside the registry
//! call that changed the genotype's status.

use crate::genotype::Genotype;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdEvent {
    /// The genotype reached the population threshold or became dominant
    Reached,
    /// The genotype left the active population
    Lost,
}

pub trait ThresholdListener {
    fn on_threshold_event(&mut self, event: ThresholdEvent, genotype: &Genotype);
}

impl<F> ThresholdListener for F
where
    F: FnMut(ThresholdEvent, &Genotype),
{
    fn on_threshold_event(&mut self, event: ThresholdEvent, genotype: &Genotype) {
        self(event, genotype)
    }
}
