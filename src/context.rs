use serde::Serialize;
use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::assembler::MergedLapRow;
use crate::cleaning::remove_invalid_laps;
use crate::normalize::{attach_relative_pace, normalize_fuel_load, NormalizedLap};
use crate::strategy::{summarize_stints, StintReport};

/// Driver and track names to keep. An empty set does not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FilterSelection {
    pub drivers: BTreeSet<String>,
    pub tracks: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new<D, T>(drivers: D, tracks: T) -> Self
    where
        D: IntoIterator<Item = String>,
        T: IntoIterator<Item = String>,
    {
        Self {
            drivers: drivers.into_iter().collect(),
            tracks: tracks.into_iter().collect(),
        }
    }

    pub fn matches(&self, row: &MergedLapRow) -> bool {
        (self.drivers.is_empty() || self.drivers.contains(&row.driver_name))
            && (self.tracks.is_empty() || self.tracks.contains(&row.track_name))
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.tracks.is_empty()
    }
}

/// Everything derived for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisView {
    pub selection: FilterSelection,
    pub stints: StintReport,
    pub laps: Vec<NormalizedLap>,
}

/// Holds the master table for a season, the current selection and the views
/// already derived from it.
///
/// Lap cleaning runs once over the whole field. Selections only filter its
/// output, so changing the selection never changes which laps count as
/// field-slowed.
pub struct AnalysisContext {
    master: Vec<MergedLapRow>,
    selection: FilterSelection,
    cleaned: OnceCell<Vec<NormalizedLap>>,
    views: HashMap<FilterSelection, Rc<AnalysisView>>,
}

impl AnalysisContext {
    pub fn new(master: Vec<MergedLapRow>) -> Self {
        Self {
            master,
            selection: FilterSelection::default(),
            cleaned: OnceCell::new(),
            views: HashMap::new(),
        }
    }

    pub fn master(&self) -> &[MergedLapRow] {
        &self.master
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn select(&mut self, selection: FilterSelection) -> Rc<AnalysisView> {
        self.selection = selection;
        self.view()
    }

    /// View for the current selection, derived on first use.
    pub fn view(&mut self) -> Rc<AnalysisView> {
        if let Some(view) = self.views.get(&self.selection) {
            return Rc::clone(view);
        }
        debug!("deriving view for {:?}", self.selection);

        let filtered: Vec<MergedLapRow> =
            self.master.iter().filter(|row| self.selection.matches(row)).cloned().collect();
        let stints = summarize_stints(&filtered);

        let master = &self.master;
        let cleaned = self.cleaned.get_or_init(|| {
            attach_relative_pace(normalize_fuel_load(remove_invalid_laps(master)))
        });
        let laps = cleaned.iter().filter(|lap| self.selection.matches(&lap.lap.row)).cloned().collect();

        let view = Rc::new(AnalysisView { selection: self.selection.clone(), stints, laps });
        self.views.insert(self.selection.clone(), Rc::clone(&view));
        view
    }

    pub fn driver_names(&self) -> BTreeSet<&str> {
        self.master.iter().map(|row| row.driver_name.as_str()).collect()
    }

    pub fn track_names(&self) -> BTreeSet<&str> {
        self.master.iter().map(|row| row.track_name.as_str()).collect()
    }
}
