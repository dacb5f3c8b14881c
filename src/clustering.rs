//! Representative days produced by clustering a long horizon.
//!
//! The clustering itself is done elsewhere. This module reads its outputs and uses them to build
//! a smaller backpack in which each representative day is weighted by the number of days of its
//! cluster.
use crate::backpack::{Backpack, ConfigurationError};
use crate::horizon::steps_per_day;
use crate::input::read_toml;
use crate::meter::{MeterID, MeterMap};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Time series for each representative day, keyed by cluster label
pub type RepresentativeSeries = IndexMap<String, Vec<f64>>;

/// Time series for each meter and representative day
pub type MeterRepresentativeSeries = IndexMap<MeterID, RepresentativeSeries>;

/// The outputs of clustering the days of a horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringOutputs {
    /// Sum of squared distances of days to their cluster centre
    #[serde(default)]
    pub inertia: Option<f64>,
    /// The cluster label of each day of the original horizon
    pub cluster_labels: Vec<String>,
    /// Number of days in each cluster, in the order the representative days should be used
    pub cluster_nr_days: IndexMap<String, f64>,
    /// Consumption on each representative day
    pub representative_e_c: MeterRepresentativeSeries,
    /// Generation profile factor on each representative day
    pub representative_e_g_factor: MeterRepresentativeSeries,
    /// Buy tariff on each representative day
    pub representative_l_buy: MeterRepresentativeSeries,
    /// Sell tariff on each representative day
    pub representative_l_sell: MeterRepresentativeSeries,
    /// Pool tariff on each representative day
    pub representative_l_grid: RepresentativeSeries,
}

impl ClusteringOutputs {
    /// Read clustering outputs from a TOML file
    pub fn from_path(file_path: &Path) -> Result<Self> {
        read_toml(file_path)
    }
}

/// Concatenate the series of the given labels, checking each covers exactly one day
fn concatenate_days(
    series: &RepresentativeSeries,
    labels: &[&String],
    steps_per_day: usize,
    meter: Option<&MeterID>,
    field: &'static str,
) -> Result<Vec<f64>, ConfigurationError> {
    let err = |message: String| match meter {
        Some(id) => ConfigurationError::for_meter(id, field, message),
        None => ConfigurationError::new(field, message),
    };

    let mut values = Vec::new();
    for label in labels {
        let day = series
            .get(*label)
            .ok_or_else(|| err(format!("no series for cluster {label}")))?;
        if day.len() != steps_per_day {
            return Err(err(format!(
                "series for cluster {label} has {} values but a day has {steps_per_day} steps",
                day.len()
            )));
        }
        values.extend_from_slice(day);
    }

    Ok(values)
}

/// Get the representative days of a meter for one of the meter's fields
fn meter_days<'a>(
    series: &'a MeterRepresentativeSeries,
    id: &MeterID,
    field: &'static str,
) -> Result<&'a RepresentativeSeries, ConfigurationError> {
    series.get(id).ok_or_else(|| {
        ConfigurationError::for_meter(id, field, "meter missing from clustering outputs".into())
    })
}

impl Backpack {
    /// Get a backpack covering only the representative days of the given clustering.
    ///
    /// The representative days are used in the order of `cluster_nr_days`, and each is weighted
    /// by the number of days in its cluster. Everything which does not vary with time is taken
    /// from this backpack.
    pub fn with_representative_days(
        &self,
        clustering: &ClusteringOutputs,
    ) -> Result<Backpack, ConfigurationError> {
        let steps_per_day = steps_per_day(self.delta_t).ok_or_else(|| {
            ConfigurationError::new(
                "delta_t",
                "must divide a day exactly to use representative days".into(),
            )
        })?;

        let labels: Vec<&String> = clustering.cluster_nr_days.keys().collect();
        if labels.is_empty() {
            return Err(ConfigurationError::new(
                "cluster_nr_days",
                "at least one cluster is required".into(),
            ));
        }
        if let Some(label) = clustering
            .cluster_labels
            .iter()
            .find(|label| !clustering.cluster_nr_days.contains_key(*label))
        {
            return Err(ConfigurationError::new(
                "cluster_labels",
                format!("unknown cluster {label}"),
            ));
        }

        let mut meters = MeterMap::with_capacity(self.meters.len());
        for (id, meter) in &self.meters {
            let days = |series: &MeterRepresentativeSeries,
                        field: &'static str|
             -> Result<Vec<f64>, ConfigurationError> {
                concatenate_days(
                    meter_days(series, id, field)?,
                    &labels,
                    steps_per_day,
                    Some(id),
                    field,
                )
            };

            let mut meter = meter.clone();
            meter.e_c = days(&clustering.representative_e_c, "representative_e_c")?;
            meter.e_g_factor = days(
                &clustering.representative_e_g_factor,
                "representative_e_g_factor",
            )?;
            meter.l_buy = days(&clustering.representative_l_buy, "representative_l_buy")?;
            meter.l_sell = days(&clustering.representative_l_sell, "representative_l_sell")?;
            meters.insert(id.clone(), meter);
        }

        Ok(Backpack {
            nr_days: labels.len() as f64,
            l_grid: concatenate_days(
                &clustering.representative_l_grid,
                &labels,
                steps_per_day,
                None,
                "representative_l_grid",
            )?,
            day_weights: Some(clustering.cluster_nr_days.values().copied().collect()),
            meters,
            ..self.clone()
        })
    }
}
