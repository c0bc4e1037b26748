//! Report assembly and spreadsheet serialization
//!
//! Pivots the per-product results into the three aggregate tables and
//! serializes them as a three-sheet workbook. Products whose fits failed
//! keep their rows with explicit markers; they are never silently dropped.

use rust_xlsxwriter::{Workbook, Worksheet};

use crate::engine::BatchAnalysis;
use crate::errors::StatsResult;
use crate::types::AnalysisConfig;

/// Fixed name of the downloadable report
pub const REPORT_FILE_NAME: &str = "Sales_Analysis_Report.xlsx";

/// MIME type of the serialized report
pub const REPORT_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Marker for products whose ICC could not be estimated
const ICC_MISSING_MARKER: &str = "NA";

/// Marker for undefined correlation cells
const CORRELATION_UNDEFINED_MARKER: &str = "undefined";

/// One row of the ICC overview sheet
#[derive(Debug, Clone)]
pub struct IccRow {
    /// Product column name
    pub product: String,
    /// ICC value; `None` renders as the missing marker
    pub icc: Option<f64>,
}

/// Correlation pivot: rows = metrics (configured order), columns = products
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    /// Row labels
    pub metrics: Vec<String>,
    /// Column labels
    pub products: Vec<String>,
    /// `values[metric][product]`; `None` renders as the undefined marker
    pub values: Vec<Vec<Option<f64>>>,
}

/// One row of the LMM detail sheet
#[derive(Debug, Clone)]
pub struct LmmDetailRow {
    /// Product column name
    pub product: String,
    /// Metric column name
    pub metric: String,
    /// Coefficient estimate
    pub estimate: f64,
    /// Standard error
    pub std_error: f64,
    /// z-statistic
    pub z_value: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// 95% confidence interval lower bound
    pub ci_lower: f64,
    /// 95% confidence interval upper bound
    pub ci_upper: f64,
}

/// The three aggregate tables of one analysis run
#[derive(Debug, Clone)]
pub struct Report {
    /// One row per product
    pub icc_overview: Vec<IccRow>,
    /// Metrics x products pivot
    pub correlations: CorrelationMatrix,
    /// One row per metric per fitted product
    pub lmm_details: Vec<LmmDetailRow>,
}

/// Collect batch results into the three report tables.
///
/// Row and column ordering follows the configuration: products in
/// `product_columns` order, metrics in `metric_columns` order. Fit
/// failures keep their ICC rows and correlation cells (as markers) and
/// contribute zero LMM detail rows.
pub fn assemble(batch: &BatchAnalysis, config: &AnalysisConfig) -> Report {
    let icc_overview = batch
        .results
        .iter()
        .map(|result| IccRow {
            product: result.product.clone(),
            icc: result.icc.as_ref().map(|est| est.icc),
        })
        .collect();

    let products: Vec<String> = batch.results.iter().map(|r| r.product.clone()).collect();
    let values = (0..config.metric_columns.len())
        .map(|m| {
            batch
                .results
                .iter()
                .map(|result| result.correlations.get(m).and_then(|c| c.r))
                .collect()
        })
        .collect();
    let correlations = CorrelationMatrix {
        metrics: config.metric_columns.clone(),
        products,
        values,
    };

    let mut lmm_details = Vec::new();
    for result in &batch.results {
        let Some(effects) = &result.lmm else { continue };
        for metric_effect in effects {
            let effect = &metric_effect.effect;
            lmm_details.push(LmmDetailRow {
                product: result.product.clone(),
                metric: metric_effect.metric.clone(),
                estimate: effect.estimate,
                std_error: effect.std_error,
                z_value: effect.z_value,
                p_value: effect.p_value,
                ci_lower: effect.ci_lower,
                ci_upper: effect.ci_upper,
            });
        }
    }

    Report {
        icc_overview,
        correlations,
        lmm_details,
    }
}

impl Report {
    /// Serialize to a three-sheet xlsx workbook in memory.
    pub fn to_xlsx_bytes(&self) -> StatsResult<Vec<u8>> {
        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet();
        sheet.set_name("ICC_Overview")?;
        sheet.write_string(0, 0, "Product")?;
        sheet.write_string(0, 1, "ICC")?;
        for (i, row) in self.icc_overview.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &row.product)?;
            match row.icc {
                Some(value) => write_number_cell(sheet, r, 1, value)?,
                None => {
                    sheet.write_string(r, 1, ICC_MISSING_MARKER)?;
                }
            }
        }

        let sheet = workbook.add_worksheet();
        sheet.set_name("All_Correlations")?;
        sheet.write_string(0, 0, "Metric")?;
        for (j, product) in self.correlations.products.iter().enumerate() {
            sheet.write_string(0, (j + 1) as u16, product)?;
        }
        for (i, metric) in self.correlations.metrics.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, metric)?;
            for (j, cell) in self.correlations.values[i].iter().enumerate() {
                let c = (j + 1) as u16;
                match cell {
                    Some(value) => write_number_cell(sheet, r, c, *value)?,
                    None => {
                        sheet.write_string(r, c, CORRELATION_UNDEFINED_MARKER)?;
                    }
                }
            }
        }

        let sheet = workbook.add_worksheet();
        sheet.set_name("LMM_Full_Details")?;
        for (c, header) in ["Product", "Metric", "Coef", "Std.Err", "z", "P_value", "[0.025", "0.975]"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, c as u16, *header)?;
        }
        for (i, row) in self.lmm_details.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &row.product)?;
            sheet.write_string(r, 1, &row.metric)?;
            write_number_cell(sheet, r, 2, row.estimate)?;
            write_number_cell(sheet, r, 3, row.std_error)?;
            write_number_cell(sheet, r, 4, row.z_value)?;
            write_number_cell(sheet, r, 5, row.p_value)?;
            write_number_cell(sheet, r, 6, row.ci_lower)?;
            write_number_cell(sheet, r, 7, row.ci_upper)?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

/// Write a numeric cell; non-finite values are stored as text since xlsx
/// has no representation for them.
fn write_number_cell(sheet: &mut Worksheet, row: u32, col: u16, value: f64) -> StatsResult<()> {
    if value.is_finite() {
        sheet.write_number(row, col, value)?;
    } else {
        sheet.write_string(row, col, format!("{value}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MetricCorrelation, MetricEffect, ProductAnalysis};
    use crate::models::IccEstimate;
    use crate::types::FixedEffect;

    fn effect(estimate: f64) -> FixedEffect {
        FixedEffect {
            estimate,
            std_error: 0.1,
            z_value: estimate / 0.1,
            p_value: 0.01,
            ci_lower: estimate - 0.2,
            ci_upper: estimate + 0.2,
        }
    }

    fn sample_batch() -> (BatchAnalysis, AnalysisConfig) {
        let metrics = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
        let config = AnalysisConfig {
            group_column: "store_id".to_string(),
            metric_columns: metrics.clone(),
            product_columns: vec!["prod_A".to_string(), "prod_B".to_string()],
        };

        let fitted = ProductAnalysis {
            product: "prod_A".to_string(),
            correlations: metrics
                .iter()
                .map(|m| MetricCorrelation {
                    metric: m.clone(),
                    r: Some(0.5),
                    n: 30,
                })
                .collect(),
            icc: Some(IccEstimate {
                icc: 0.4,
                between_variance: 2.0,
                within_variance: 3.0,
                n_observations: 30,
                n_groups: 3,
            }),
            lmm: Some(
                metrics
                    .iter()
                    .map(|m| MetricEffect {
                        metric: m.clone(),
                        effect: effect(1.5),
                    })
                    .collect(),
            ),
        };
        let failed = ProductAnalysis {
            product: "prod_B".to_string(),
            correlations: metrics
                .iter()
                .map(|m| MetricCorrelation {
                    metric: m.clone(),
                    r: None,
                    n: 2,
                })
                .collect(),
            icc: None,
            lmm: None,
        };

        (
            BatchAnalysis {
                results: vec![fitted, failed],
            },
            config,
        )
    }

    #[test]
    fn test_pivot_dimensions_survive_failures() {
        let (batch, config) = sample_batch();
        let report = assemble(&batch, &config);

        assert_eq!(report.icc_overview.len(), 2);
        assert_eq!(report.correlations.metrics.len(), 3);
        assert_eq!(report.correlations.products.len(), 2);
        assert_eq!(report.correlations.values.len(), 3);
        for row in &report.correlations.values {
            assert_eq!(row.len(), 2);
        }
    }

    #[test]
    fn test_failed_products_keep_rows_and_skip_details() {
        let (batch, config) = sample_batch();
        let report = assemble(&batch, &config);

        // The failed product keeps its overview row with no value
        assert_eq!(report.icc_overview[1].product, "prod_B");
        assert!(report.icc_overview[1].icc.is_none());

        // Detail rows only from the fitted product, one per metric
        assert_eq!(report.lmm_details.len(), 3);
        assert!(report.lmm_details.iter().all(|r| r.product == "prod_A"));
        // Only configured metrics appear, never an intercept row
        assert!(report
            .lmm_details
            .iter()
            .all(|r| config.metric_columns.contains(&r.metric)));
    }

    #[test]
    fn test_xlsx_bytes_are_zip_container() {
        let (batch, config) = sample_batch();
        let report = assemble(&batch, &config);
        let bytes = report.to_xlsx_bytes().unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }
}
