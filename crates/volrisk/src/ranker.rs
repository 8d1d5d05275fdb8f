//! Per-company evaluation, ranking by value-to-risk and export.
//!
//! Each company runs through `validate -> resolve sector -> expected return ->
//! risk -> VTR`. A failure at any stage drops only that company.

use crate::config::{CompaniesConfig, CompanyConfig, SectorSelector, SectorsConfig};
use crate::error::{Error, Result, Stage};
use crate::sector::{ComputedSectors, SectorAnalyzer, SectorBlend, SectorMetrics};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use volrisk_data::QuoteSource;
use volrisk_metrics::{BetaDiagnostics, BetaEstimator, FitMethod, MetricsError, returns};
use volrisk_output::{
    BetaSource, DetailRow, ExportFormat, RankedRow, RankingReport, RankingSummary,
};
use volrisk_risk::{
    ExpectedReturn, RiskAssessment, RiskConfig, SchemeCParams, calculate_risk,
    value_to_risk_ratio,
};

/// Beta used by a Scheme C company and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaResolution {
    /// Beta value
    pub value: f64,
    /// Provenance
    pub source: BetaSource,
    /// Regression diagnostics, when a regression was attempted
    pub diagnostics: Option<BetaDiagnostics>,
}

impl BetaResolution {
    const fn fixed(value: f64, source: BetaSource) -> Self {
        Self {
            value,
            source,
            diagnostics: None,
        }
    }
}

/// Everything computed for one company.
#[derive(Debug, Clone)]
pub struct CompanyResult {
    /// Company name
    pub name: String,
    /// Sector descriptor
    pub sector_info: String,
    /// Sectors behind the proxy and their weights
    pub sectors: Vec<(Arc<SectorMetrics>, f64)>,
    /// Proxy downside volatility
    pub sigma_down: f64,
    /// Proxy total volatility
    pub sigma_total: f64,
    /// Proxy maximum drawdown
    pub mdd: f64,
    /// Expected return and its terms
    pub expected: ExpectedReturn,
    /// Loss risk and its terms
    pub risk: RiskAssessment,
    /// Beta, for Scheme C
    pub beta: Option<BetaResolution>,
    /// Value-to-risk ratio
    pub vtr: f64,
}

impl CompanyResult {
    /// Expected return before execution probability.
    pub const fn er_raw(&self) -> f64 {
        self.expected.er_raw
    }

    /// Execution-adjusted expected return.
    pub const fn er(&self) -> f64 {
        self.expected.er
    }

    /// Loss risk.
    pub const fn loss_risk(&self) -> f64 {
        self.risk.total_risk
    }

    /// Ranked-table row.
    pub fn ranked_row(&self, rank: usize) -> RankedRow {
        let inputs = &self.risk.inputs;
        RankedRow {
            rank,
            name: self.name.clone(),
            sector: self.sector_info.clone(),
            mode: self.risk.mode,
            sigma_total: self.sigma_total,
            sigma_down: self.sigma_down,
            mdd: self.mdd,
            er_raw: self.er_raw(),
            er: self.er(),
            loss_risk: self.loss_risk(),
            vtr: self.vtr,
            beta: inputs.beta,
            frag: inputs.frag,
            idio: inputs.idio,
            w: inputs.w,
            fragility_add: inputs.fragility_add,
        }
    }

    /// Provenance row; its terms re-derive every number of [`Self::ranked_row`].
    pub fn detail_row(&self, rank: usize) -> DetailRow {
        let inputs = &self.risk.inputs;
        let model = self.expected.model;
        let verify_er = model.map_or(self.expected.er, |t| {
            (t.multiple_return + t.dividend_yield + t.buyback_yield) * t.execution_prob
        });
        let [downside_term, second_term, fragility_term] = self.risk.terms.components();
        let verify_sum = downside_term + second_term + fragility_term;
        let regression = self
            .beta
            .as_ref()
            .and_then(|b| b.diagnostics.as_ref())
            .filter(|d| d.method != FitMethod::Fallback);

        DetailRow {
            rank,
            name: self.name.clone(),
            sector: self.sector_info.clone(),
            mode: self.risk.mode,
            er_source: self.expected.source,
            multiple_type: model.map(|t| t.multiple_type),
            multiple_return: model.map(|t| t.multiple_return),
            dividend_yield: model.map(|t| t.dividend_yield),
            buyback_yield: model.map(|t| t.buyback_yield),
            execution_prob: model.map(|t| t.execution_prob),
            er_raw: self.er_raw(),
            er: self.er(),
            verify_er,
            sigma_down: self.sigma_down,
            sigma_total: self.sigma_total,
            mdd: self.mdd,
            beta: inputs.beta,
            beta_source: self.beta.as_ref().map(|b| b.source),
            beta_r_squared: regression.map(|d| d.r_squared),
            beta_n_obs: regression.map(|d| d.n_obs),
            frag: inputs.frag,
            w_down: inputs.weights.map(|w| w.w_down),
            w_beta: inputs.weights.map(|w| w.w_beta),
            w_frag: inputs.weights.map(|w| w.w_frag),
            idio: inputs.idio,
            w: inputs.w,
            fragility_add: inputs.fragility_add,
            downside_term,
            second_term,
            fragility_term,
            verify_sum,
            loss_risk: self.loss_risk(),
            verify_vtr: value_to_risk_ratio(verify_er, verify_sum),
            vtr: self.vtr,
        }
    }
}

/// Sector descriptor: `NAME(T1,T2)` for one sector, `A(60%) + B(40%)` for a mix.
pub fn sector_info(selector: &SectorSelector, proxy: &SectorBlend) -> String {
    match selector {
        SectorSelector::Single(name) => proxy
            .parts
            .first()
            .map_or_else(|| name.clone(), |(m, _)| m.descriptor()),
        SectorSelector::Mix(mix) => mix
            .iter()
            .map(|(name, w)| format!("{name}({:.0}%)", w * 100.0))
            .collect::<Vec<_>>()
            .join(" + "),
    }
}

/// Descending VTR; NaN sorts last.
fn by_vtr_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Sort by VTR, best first. Ties keep their input order.
pub fn rank(mut results: Vec<CompanyResult>) -> Vec<CompanyResult> {
    results.sort_by(|a, b| by_vtr_desc(a.vtr, b.vtr));
    results
}

/// Report over already ranked results.
pub fn build_report(ranked: &[CompanyResult], sectors: &ComputedSectors) -> RankingReport {
    let (rows, details) = ranked
        .iter()
        .enumerate()
        .map(|(i, r)| (r.ranked_row(i + 1), r.detail_row(i + 1)))
        .unzip();
    RankingReport::new(rows, details, sectors.rows())
}

/// Rank `results`, write the report to `path` and return it.
///
/// Nothing is written when there are no results.
pub fn rank_and_export(
    results: Vec<CompanyResult>,
    sectors: &ComputedSectors,
    path: &Path,
    format: ExportFormat,
) -> Result<RankingReport> {
    let ranked = rank(results);
    let report = build_report(&ranked, sectors);
    if report.is_empty() {
        warn!(path = %path.display(), "no results to rank; report not written");
        return Ok(report);
    }
    report.write(path, format)?;
    for line in RankingSummary::new(&report.ranking, volrisk_output::DEFAULT_TOP_N).lines() {
        info!("{line}");
    }
    Ok(report)
}

/// Runs the per-company pipeline.
#[derive(Debug)]
pub struct Ranker<S> {
    analyzer: SectorAnalyzer<S>,
    beta: BetaEstimator,
}

impl<S: QuoteSource> Ranker<S> {
    /// Create a ranker; the beta estimator follows the analyzer's settings.
    pub fn new(analyzer: SectorAnalyzer<S>) -> Self {
        let settings = analyzer.settings();
        let beta = BetaEstimator::new(settings.beta_method, settings.min_overlap);
        Self { analyzer, beta }
    }

    /// Sector analyzer.
    pub const fn analyzer(&self) -> &SectorAnalyzer<S> {
        &self.analyzer
    }

    /// Beta estimator and its memo.
    pub const fn beta_estimator(&self) -> &BetaEstimator {
        &self.beta
    }

    /// Compute sectors, then evaluate every company against them.
    pub async fn run(
        &mut self,
        sectors: &SectorsConfig,
        companies: &CompaniesConfig,
    ) -> (ComputedSectors, Vec<CompanyResult>) {
        let computed = self.analyzer.compute_all(sectors).await;
        let results = self.evaluate_all(companies, &computed).await;
        (computed, results)
    }

    /// Evaluate companies in order, dropping the ones that fail.
    pub async fn evaluate_all(
        &mut self,
        companies: &CompaniesConfig,
        sectors: &ComputedSectors,
    ) -> Vec<CompanyResult> {
        let mut results = Vec::with_capacity(companies.companies.len());
        for company in &companies.companies {
            match self.evaluate(company, sectors).await {
                Ok(result) => {
                    info!(
                        company = %result.name,
                        er = result.er(),
                        loss_risk = result.loss_risk(),
                        vtr = result.vtr,
                        "company evaluated"
                    );
                    results.push(result);
                }
                Err(e) => error!(company = %company.name, error = %e, "company skipped"),
            }
        }
        info!(
            ranked = results.len(),
            configured = companies.companies.len(),
            "company batch finished"
        );
        results
    }

    /// Evaluate one company.
    pub async fn evaluate(
        &mut self,
        company: &CompanyConfig,
        sectors: &ComputedSectors,
    ) -> Result<CompanyResult> {
        let name = company.name.as_str();

        company
            .validate()
            .map_err(|e| e.at_stage(name, Stage::Validate))?;

        let proxy = self
            .resolve_sector(&company.selector, sectors)
            .map_err(|e| e.at_stage(name, Stage::ResolveSector))?;

        let expected = company
            .returns
            .evaluate()
            .map_err(|e| Error::from(e).at_stage(name, Stage::ComputeExpectedReturn))?;

        let (risk, beta) = self
            .compute_risk(company, &proxy)
            .await
            .map_err(|e| e.at_stage(name, Stage::ComputeRisk))?;

        let vtr = value_to_risk_ratio(expected.er, risk.total_risk);
        if vtr.is_nan() {
            return Err(Error::UndefinedRatio {
                expected_return: expected.er,
                loss_risk: risk.total_risk,
            }
            .at_stage(name, Stage::ComputeVtr));
        }
        if risk.total_risk <= 0.0 {
            warn!(
                company = %name,
                loss_risk = risk.total_risk,
                "non-positive loss risk; VTR is +inf"
            );
        }

        Ok(CompanyResult {
            name: company.name.clone(),
            sector_info: sector_info(&company.selector, &proxy),
            sigma_down: proxy.sigma_down,
            sigma_total: proxy.sigma_total,
            mdd: proxy.mdd,
            sectors: proxy.parts,
            expected,
            risk,
            beta,
            vtr,
        })
    }

    fn resolve_sector(
        &self,
        selector: &SectorSelector,
        sectors: &ComputedSectors,
    ) -> Result<SectorBlend> {
        match selector {
            SectorSelector::Single(name) => sectors
                .get(name)
                .map(|m| SectorBlend::single(Arc::clone(m)))
                .ok_or_else(|| MetricsError::MissingSector(name.clone()).into()),
            SectorSelector::Mix(mix) => self.analyzer.blend_across_sectors(mix, sectors),
        }
    }

    async fn compute_risk(
        &mut self,
        company: &CompanyConfig,
        proxy: &SectorBlend,
    ) -> Result<(RiskAssessment, Option<BetaResolution>)> {
        match &company.risk {
            RiskConfig::SchemeC(params) => {
                let beta = self.resolve_beta(company, params, proxy).await?;
                let config = RiskConfig::SchemeC(SchemeCParams {
                    beta: Some(beta.value),
                    ..*params
                });
                let risk = calculate_risk(proxy.sigma_down, proxy.sigma_total, proxy.mdd, &config)?;
                Ok((risk, Some(beta)))
            }
            config @ RiskConfig::SemiMdd(_) => {
                let risk = calculate_risk(proxy.sigma_down, proxy.sigma_total, proxy.mdd, config)?;
                Ok((risk, None))
            }
        }
    }

    /// Configured beta, else a regression of the company's own returns on the
    /// proxy returns, else 1.0.
    async fn resolve_beta(
        &mut self,
        company: &CompanyConfig,
        params: &SchemeCParams,
        proxy: &SectorBlend,
    ) -> Result<BetaResolution> {
        if let Some(beta) = params.beta {
            return Ok(BetaResolution::fixed(beta, BetaSource::Config));
        }
        let Some(ticker) = company.ticker.as_deref() else {
            return Ok(BetaResolution::fixed(1.0, BetaSource::Default));
        };

        let request = &self.analyzer.settings().request;
        let Some(prices) = self.analyzer.fetcher().fetch(ticker, request).await else {
            return match company.beta_fallback {
                Some(beta) => {
                    warn!(
                        company = %company.name,
                        ticker = %ticker,
                        fallback = beta,
                        "no prices for beta; using fallback"
                    );
                    Ok(BetaResolution::fixed(beta, BetaSource::Fallback))
                }
                None => Err(Error::DataUnavailable {
                    ticker: ticker.to_string(),
                }),
            };
        };

        let stock = returns(&prices);
        let (value, diagnostics) =
            self.beta
                .calculate(&stock, &proxy.returns, company.beta_fallback, true)?;
        let source = if diagnostics.method == FitMethod::Fallback {
            BetaSource::Fallback
        } else {
            BetaSource::Regression
        };
        info!(
            company = %company.name,
            ticker = %ticker,
            beta = value,
            r_squared = diagnostics.r_squared,
            n_obs = diagnostics.n_obs,
            source = %source,
            "beta resolved"
        );
        Ok(BetaResolution {
            value,
            source,
            diagnostics: Some(diagnostics),
        })
    }
}
