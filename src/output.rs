//! The module responsible for writing output data to disk.
use crate::meter::MeterID;
use crate::optimisation::solver::MilpStatus;
use crate::outputs::{MeterResults, PoolOutputs, PoolResults};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The root folder in which backpack-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "rec_sizing_results";

/// The output file name for the summary of the optimisation
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// The output file name for costs of each meter
const METER_COSTS_FILE_NAME: &str = "meter_costs.csv";

/// The output file name for the schedule of each meter
const METER_SCHEDULES_FILE_NAME: &str = "meter_schedules.csv";

/// The output file name for community-level results
const COMMUNITY_FILE_NAME: &str = "community.csv";

/// The output file name for the binary variables
const BINARIES_FILE_NAME: &str = "debug_binaries.csv";

/// Get the default output folder for the backpack at the specified path
pub fn get_output_dir(backpack_path: &Path) -> Result<PathBuf> {
    let backpack_name = backpack_path
        .file_stem()
        .context("Backpack path has no file name")?
        .to_str()
        .context("Invalid chars in backpack file name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, backpack_name].iter().collect())
}

/// Create a new output directory.
///
/// If the directory already exists and isn't empty, its contents are only deleted if `overwrite`
/// is true.
///
/// # Returns
///
/// Whether an existing directory was overwritten.
pub fn create_output_directory(output_dir: &Path, overwrite: bool) -> Result<bool> {
    let mut overwritten = false;
    if output_dir.is_dir() {
        let is_empty = output_dir.read_dir()?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        overwritten = true;
    }

    fs::create_dir_all(output_dir)?;

    Ok(overwritten)
}

/// The contents of the summary file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Summary {
    milp_status: MilpStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    obj_value: Option<f64>,
}

/// Represents a row in the meter costs CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct MeterCostsRow {
    meter_id: MeterID,
    c_ind2pool: f64,
    c_ind2pool_without_deg: f64,
    c_ind2pool_without_p_extra: f64,
    c_ind2pool_without_deg_and_p_extra: f64,
    deg_cost2pool: f64,
    p_extra_cost2pool: f64,
    investment_cost: f64,
    p_gn: f64,
    e_bn: f64,
}

impl MeterCostsRow {
    fn new(meter_id: &MeterID, results: &MeterResults) -> Self {
        Self {
            meter_id: meter_id.clone(),
            c_ind2pool: results.c_ind2pool,
            c_ind2pool_without_deg: results.c_ind2pool_without_deg,
            c_ind2pool_without_p_extra: results.c_ind2pool_without_p_extra,
            c_ind2pool_without_deg_and_p_extra: results.c_ind2pool_without_deg_and_p_extra,
            deg_cost2pool: results.deg_cost2pool,
            p_extra_cost2pool: results.p_extra_cost2pool,
            investment_cost: results.investment_cost,
            p_gn: results.p_gn,
            e_bn: results.e_bn,
        }
    }
}

/// Represents a row in the meter schedules CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct MeterScheduleRow {
    meter_id: MeterID,
    step: usize,
    e_cmet: f64,
    e_consumed: f64,
    e_sold: f64,
    e_pur_pool: f64,
    e_sale_pool: f64,
    e_slc_pool: f64,
    e_alc: f64,
    e_bat: f64,
    e_bc: f64,
    e_bd: f64,
    soc_bat: f64,
    p_extra: f64,
}

impl MeterScheduleRow {
    fn new(meter_id: &MeterID, step: usize, results: &MeterResults) -> Self {
        Self {
            meter_id: meter_id.clone(),
            step,
            e_cmet: results.e_cmet[step],
            e_consumed: results.e_consumed[step],
            e_sold: results.e_sold[step],
            e_pur_pool: results.e_pur_pool[step],
            e_sale_pool: results.e_sale_pool[step],
            e_slc_pool: results.e_slc_pool[step],
            e_alc: results.e_alc[step],
            e_bat: results.e_bat[step],
            e_bc: results.e_bc[step],
            e_bd: results.e_bd[step],
            soc_bat: results.soc_bat[step],
            p_extra: results.p_extra[step],
        }
    }
}

/// Represents a row in the community CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CommunityRow {
    step: usize,
    dual_price: f64,
    e_sup_retail: f64,
    e_sur_retail: f64,
    e_sup_market: f64,
    e_sur_market: f64,
    delta_rec: u8,
}

/// Represents a row in the binary variables CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BinariesRow {
    meter_id: MeterID,
    step: usize,
    delta_sup: u8,
    delta_bc: u8,
    delta_alc: u8,
    delta_slc: u8,
}

/// An object for writing the results of an optimisation to file
pub struct DataWriter {
    output_path: PathBuf,
    costs_writer: csv::Writer<File>,
    schedules_writer: csv::Writer<File>,
    community_writer: csv::Writer<File>,
    binaries_writer: Option<csv::Writer<File>>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(&file_path)
                .with_context(|| format!("Could not create {}", file_path.display()))
        };

        Ok(Self {
            output_path: output_path.to_path_buf(),
            costs_writer: new_writer(METER_COSTS_FILE_NAME)?,
            schedules_writer: new_writer(METER_SCHEDULES_FILE_NAME)?,
            community_writer: new_writer(COMMUNITY_FILE_NAME)?,
            binaries_writer: save_debug_info
                .then(|| new_writer(BINARIES_FILE_NAME))
                .transpose()?,
        })
    }

    /// Write all outputs of an optimisation
    pub fn write_outputs(&mut self, outputs: &PoolOutputs) -> Result<()> {
        self.write_summary(outputs)?;
        if let Some(results) = &outputs.results {
            self.write_meter_costs(results)?;
            self.write_meter_schedules(results)?;
            self.write_community(results)?;
            self.write_binaries(results)?;
        }

        Ok(())
    }

    /// Write the status and objective value to a TOML file
    fn write_summary(&self, outputs: &PoolOutputs) -> Result<()> {
        let summary = Summary {
            milp_status: outputs.milp_status,
            obj_value: outputs.results.as_ref().map(|results| results.obj_value),
        };
        let file_path = self.output_path.join(SUMMARY_FILE_NAME);
        fs::write(&file_path, toml::to_string(&summary)?)
            .with_context(|| format!("Could not write {}", file_path.display()))?;

        Ok(())
    }

    /// Write the costs and capacities of each meter
    fn write_meter_costs(&mut self, results: &PoolResults) -> Result<()> {
        for (meter_id, meter) in &results.meters {
            self.costs_writer
                .serialize(MeterCostsRow::new(meter_id, meter))?;
        }

        Ok(())
    }

    /// Write the schedule of each meter
    fn write_meter_schedules(&mut self, results: &PoolResults) -> Result<()> {
        for (meter_id, meter) in &results.meters {
            for step in 0..meter.e_cmet.len() {
                self.schedules_writer
                    .serialize(MeterScheduleRow::new(meter_id, step, meter))?;
            }
        }

        Ok(())
    }

    /// Write pool prices and community-level totals
    fn write_community(&mut self, results: &PoolResults) -> Result<()> {
        for (step, dual_price) in results.dual_prices.iter().enumerate() {
            let row = CommunityRow {
                step,
                dual_price: *dual_price,
                e_sup_retail: results.e_sup_retail[step],
                e_sur_retail: results.e_sur_retail[step],
                e_sup_market: results.e_sup_market[step],
                e_sur_market: results.e_sur_market[step],
                delta_rec: results.delta_rec[step],
            };
            self.community_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write binary variables to file, if debug info is enabled
    fn write_binaries(&mut self, results: &PoolResults) -> Result<()> {
        let Some(writer) = &mut self.binaries_writer else {
            return Ok(());
        };

        for (meter_id, meter) in &results.meters {
            for step in 0..meter.delta_sup.len() {
                writer.serialize(BinariesRow {
                    meter_id: meter_id.clone(),
                    step,
                    delta_sup: meter.delta_sup[step],
                    delta_bc: meter.delta_bc[step],
                    delta_alc: meter.delta_alc[step],
                    delta_slc: meter.delta_slc[step],
                })?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.costs_writer.flush()?;
        self.schedules_writer.flush()?;
        self.community_writer.flush()?;
        if let Some(writer) = &mut self.binaries_writer {
            writer.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::pool_outputs;
    use itertools::Itertools;
    use rstest::rstest;
    use tempfile::tempdir;

    fn read_rows<T: serde::de::DeserializeOwned>(file_path: &Path) -> Vec<T> {
        csv::Reader::from_path(file_path)
            .unwrap()
            .into_deserialize()
            .try_collect()
            .unwrap()
    }

    #[test]
    fn test_get_output_dir() {
        assert_eq!(
            get_output_dir(Path::new("some/dir/backpack.toml")).unwrap(),
            PathBuf::from("rec_sizing_results/backpack")
        );
    }

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results");

        // New folder
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());

        // Existing but empty folder
        assert!(!create_output_directory(&output_dir, false).unwrap());

        // Non-empty folder
        fs::write(output_dir.join("file.txt"), "data").unwrap();
        assert!(create_output_directory(&output_dir, false).is_err());
        assert!(create_output_directory(&output_dir, true).unwrap());
        assert!(!output_dir.join("file.txt").exists());
    }

    #[rstest]
    fn test_write_outputs(pool_outputs: PoolOutputs) {
        let dir = tempdir().unwrap();
        {
            let mut writer = DataWriter::create(dir.path(), true).unwrap();
            writer.write_outputs(&pool_outputs).unwrap();
            writer.flush().unwrap();
        }

        let results = pool_outputs.results.as_ref().unwrap();
        let summary: Summary =
            toml::from_str(&fs::read_to_string(dir.path().join(SUMMARY_FILE_NAME)).unwrap())
                .unwrap();
        assert_eq!(
            summary,
            Summary {
                milp_status: MilpStatus::Optimal,
                obj_value: Some(results.obj_value)
            }
        );

        let costs: Vec<MeterCostsRow> = read_rows(&dir.path().join(METER_COSTS_FILE_NAME));
        let (meter_id, meter) = results.meters.first().unwrap();
        assert_eq!(costs, [MeterCostsRow::new(meter_id, meter)]);

        let schedules: Vec<MeterScheduleRow> =
            read_rows(&dir.path().join(METER_SCHEDULES_FILE_NAME));
        assert_eq!(schedules.len(), meter.e_cmet.len());
        assert_eq!(schedules[1], MeterScheduleRow::new(meter_id, 1, meter));

        let community: Vec<CommunityRow> = read_rows(&dir.path().join(COMMUNITY_FILE_NAME));
        assert_eq!(community.len(), results.dual_prices.len());

        let binaries: Vec<BinariesRow> = read_rows(&dir.path().join(BINARIES_FILE_NAME));
        assert_eq!(binaries.len(), meter.delta_sup.len());
    }

    #[rstest]
    fn test_write_outputs_not_optimal() {
        let dir = tempdir().unwrap();
        let outputs = PoolOutputs {
            milp_status: MilpStatus::Infeasible,
            results: None,
        };
        {
            let mut writer = DataWriter::create(dir.path(), false).unwrap();
            writer.write_outputs(&outputs).unwrap();
            writer.flush().unwrap();
        }

        let summary = fs::read_to_string(dir.path().join(SUMMARY_FILE_NAME)).unwrap();
        assert_eq!(summary.trim(), "milp_status = \"Infeasible\"");
        assert!(!dir.path().join(BINARIES_FILE_NAME).exists());
        assert!(read_rows::<MeterCostsRow>(&dir.path().join(METER_COSTS_FILE_NAME)).is_empty());
    }
}
