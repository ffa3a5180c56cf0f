//! The farming advisor catalogue
//!
//! Five advisors, declared statically. Three are refinement loops (a writer,
//! a critic with a numeric goal, a refiner), two are single search-backed
//! roles. [`Catalogue`] turns the declarations into runnable advisors for a
//! given provider, search backend and config.

use std::sync::Arc;

use kisan_config::Config;
use kisan_provider::Provider;

use crate::critique::CritiqueLoop;
use crate::orchestrator::FanOut;
use crate::pipeline::{Advisor, RefinementPipeline, SingleAdvisor};
use crate::role::{LlmAgent, LlmRole, ModelSettings, RoleTool};
use crate::router::{LlmClassifier, RoutingTable};
use crate::tools::SearchCapability;
use crate::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorKind {
    Loop,
    Single,
}

impl AdvisorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvisorKind::Loop => "loop",
            AdvisorKind::Single => "single",
        }
    }
}

/// Static declaration of one advisor
#[derive(Debug, Clone, Copy)]
pub struct AdvisorSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: AdvisorKind,
    pub report_key: &'static str,
    pub candidate_key: &'static str,
    pub feedback_key: Option<&'static str>,
}

pub const ADVISORS: &[AdvisorSpec] = &[
    AdvisorSpec {
        name: "crop_management",
        description: "Yield, price and profit plan for the crop, refined until profit exceeds $800",
        kind: AdvisorKind::Loop,
        report_key: "crop_management_report",
        candidate_key: "CROP_REPORT",
        feedback_key: Some("CROP_FEEDBACK"),
    },
    AdvisorSpec {
        name: "gov_schemes",
        description: "Government schemes and subsidies, refined until a 50% subsidy is found",
        kind: AdvisorKind::Loop,
        report_key: "gov_scheme_report",
        candidate_key: "SCHEME_DATA",
        feedback_key: Some("SCHEME_FEEDBACK"),
    },
    AdvisorSpec {
        name: "mandi_prices",
        description: "Mandi prices and selling plan, refined until profit exceeds $820",
        kind: AdvisorKind::Loop,
        report_key: "mandi_price_report",
        candidate_key: "MANDI_PRICE_DATA",
        feedback_key: Some("PROFIT_OPTIMIZATION_FEEDBACK"),
    },
    AdvisorSpec {
        name: "farming_tech",
        description: "New farming techniques suited to the crop",
        kind: AdvisorKind::Single,
        report_key: "farming_tech_report",
        candidate_key: "NEW_TECH_SUGGESTIONS",
        feedback_key: None,
    },
    AdvisorSpec {
        name: "weather",
        description: "Weather outlook and its impact on the crop",
        kind: AdvisorKind::Single,
        report_key: "weather_report",
        candidate_key: "WEATHER_REPORT",
        feedback_key: None,
    },
];

pub fn find(name: &str) -> Option<&'static AdvisorSpec> {
    ADVISORS.iter().find(|s| s.name == name)
}

/// Generator, critic and refiner roles of a loop advisor
struct LoopRoles {
    generator: LlmRole,
    critic: LlmRole,
    refiner: LlmRole,
}

fn loop_roles(spec: &AdvisorSpec) -> Option<LoopRoles> {
    let roles = match spec.name {
        "crop_management" => LoopRoles {
            generator: LlmRole::new(
                "crop_generator",
                "You are an agricultural expert. Use the search tool to find the expected yield \
                 and current market price for the farmer's crop, then write a short crop report \
                 ending with the anticipated profit.\n\n\
                 Crop: {CROP_DETAILS}\nLocation: {LOCATION?}",
            )
            .with_tool(RoleTool::Search),
            critic: LlmRole::new(
                "crop_critic",
                "You are a financial critic for a farm. Your goal is to maximise financial gain. \
                 If the anticipated profit is above $800 the goal is achieved: call exit_loop. \
                 Otherwise reply with one concrete way to improve the profit.\n\n\
                 Report:\n{CROP_REPORT}",
            )
            .with_tool(RoleTool::ExitLoop),
            refiner: LlmRole::new(
                "crop_finance",
                "You are a finance expert for a farm. Rewrite the crop report applying the \
                 critic's feedback, with a clear breakdown of the profit calculation.\n\n\
                 Report:\n{CROP_REPORT}\n\nFeedback:\n{CROP_FEEDBACK?}",
            )
            .with_tool(RoleTool::Search),
        },
        "gov_schemes" => LoopRoles {
            generator: LlmRole::new(
                "scheme_generator",
                "You are an expert on Indian government agricultural schemes. Use the search tool \
                 to find schemes and subsidies the farmer qualifies for and summarise them.\n\n\
                 Crop: {CROP_DETAILS}\nLocation: {LOCATION?}",
            )
            .with_tool(RoleTool::Search),
            critic: LlmRole::new(
                "scheme_critic",
                "You are a government scheme critic. Your goal is to maximise the subsidy for the \
                 farmer. If a subsidy of 50% or more has been found the goal is achieved: call \
                 exit_loop. Otherwise reply with where to look for a better scheme.\n\n\
                 SCHEME_DATA:\n{SCHEME_DATA}\n\nCrop: {CROP_DETAILS}",
            )
            .with_tool(RoleTool::ExitLoop),
            refiner: LlmRole::new(
                "scheme_refiner",
                "You are an expert on government agricultural schemes. Improve the scheme summary \
                 using the critic's feedback and further searches.\n\n\
                 SCHEME_DATA:\n{SCHEME_DATA}\n\nFeedback:\n{SCHEME_FEEDBACK?}",
            )
            .with_tool(RoleTool::Search),
        },
        "mandi_prices" => LoopRoles {
            generator: LlmRole::new(
                "mandi_generator",
                "You are a mandi price expert. Use the search tool to find the current mandi \
                 price for the farmer's crop and estimate the profit for the expected yield.\n\n\
                 Crop: {CROP_DETAILS}\nLocation: {LOCATION?}\nYield: {YIELD?}",
            )
            .with_tool(RoleTool::Search),
            critic: LlmRole::new(
                "mandi_critic",
                "You are a market price critic. Your goal is the best possible selling price. \
                 If the profit is above $820 the goal is achieved: call exit_loop. Otherwise \
                 reply with how to get a better price.\n\n\
                 MANDI_PRICE_DATA:\n{MANDI_PRICE_DATA}\n\nPROFIT_ANALYSIS:\n{PROFIT_ANALYSIS?}",
            )
            .with_tool(RoleTool::ExitLoop),
            refiner: LlmRole::new(
                "mandi_finance",
                "You are a finance expert for a farm. Apply the feedback to improve the selling \
                 plan. Record each profit calculation with append_to_state in the \
                 PROFIT_ANALYSIS field, then reply with the revised plan.\n\n\
                 MANDI_PRICE_DATA:\n{MANDI_PRICE_DATA}\n\nFeedback:\n{PROFIT_OPTIMIZATION_FEEDBACK?}",
            )
            .with_tool(RoleTool::Search)
            .with_tool(RoleTool::AppendToState),
        },
        _ => return None,
    };

    Some(LoopRoles {
        generator: roles.generator.describe(spec.description).writes(spec.candidate_key),
        critic: roles.critic.describe(spec.description),
        refiner: roles.refiner.describe(spec.description).writes(spec.candidate_key),
    })
}

fn single_role(spec: &AdvisorSpec) -> Option<LlmRole> {
    let role = match spec.name {
        "farming_tech" => LlmRole::new(
            "farming_tech",
            "You are a farming technology advisor. Use the search tool to find new techniques \
             that suit the farmer's crop and suggest the three most practical ones.\n\n\
             Crop: {CROP_DETAILS}",
        ),
        "weather" => LlmRole::new(
            "weather",
            "You are a weather advisor. Use the search tool to get the forecast for the farmer's \
             location and explain its impact on the crop.\n\n\
             Location: {LOCATION?}\nCrop: {CROP_DETAILS}",
        ),
        _ => return None,
    };

    Some(
        role.describe(spec.description)
            .writes(spec.candidate_key)
            .with_tool(RoleTool::Search),
    )
}

/// Builds runnable advisors from the static declarations
pub struct Catalogue {
    config: Config,
    provider: Arc<dyn Provider>,
    search: Arc<dyn SearchCapability>,
    settings: ModelSettings,
}

impl Catalogue {
    pub fn new(
        config: Config,
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchCapability>,
    ) -> Self {
        let settings = ModelSettings::from_config(&config);
        Self {
            config,
            provider,
            search,
            settings,
        }
    }

    fn agent(&self, role: LlmRole) -> Arc<LlmAgent> {
        Arc::new(LlmAgent::new(
            role,
            self.provider.clone(),
            self.search.clone(),
            self.settings.clone(),
        ))
    }

    pub fn build(&self, name: &str) -> Result<Arc<dyn Advisor>> {
        let spec = find(name).ok_or_else(|| AgentError::UnknownRoute(name.to_string()))?;

        match spec.kind {
            AdvisorKind::Loop => {
                let roles = loop_roles(spec).ok_or_else(|| {
                    AgentError::InvalidConfig(format!("no roles declared for {}", spec.name))
                })?;

                let mut refinement = CritiqueLoop::new(
                    spec.name,
                    self.agent(roles.critic),
                    self.agent(roles.refiner),
                    self.config.max_iterations_for(spec.name),
                )?;
                if let Some(key) = spec.feedback_key {
                    refinement = refinement.with_feedback_key(key);
                }

                let pipeline =
                    RefinementPipeline::new(spec.name, self.agent(roles.generator), refinement)?;
                Ok(Arc::new(pipeline))
            }
            AdvisorKind::Single => {
                let role = single_role(spec).ok_or_else(|| {
                    AgentError::InvalidConfig(format!("no role declared for {}", spec.name))
                })?;
                Ok(Arc::new(SingleAdvisor::new(self.agent(role))))
            }
        }
    }

    /// Every advisor as a fan-out branch under its report key
    pub fn fan_out(&self) -> Result<FanOut> {
        let mut fan = FanOut::new(self.config.branch_timeout());
        for spec in ADVISORS {
            fan = fan.branch(spec.report_key, self.build(spec.name)?);
        }
        Ok(fan)
    }

    pub fn routing_table(&self) -> Result<RoutingTable> {
        let mut table = RoutingTable::new();
        for spec in ADVISORS {
            table.insert(spec.name, self.build(spec.name)?);
        }
        Ok(table)
    }

    pub fn classifier(&self) -> LlmClassifier {
        LlmClassifier::new(
            self.provider.clone(),
            self.settings.clone(),
            ADVISORS
                .iter()
                .map(|s| (s.name.to_string(), s.description.to_string()))
                .collect(),
        )
    }
}
