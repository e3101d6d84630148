//! Dependency graph of provisioning steps.
//!
//! Each node declares the steps it must run after. Address-producing deploy steps feed the
//! constructor arguments of the steps that depend on them. The graph is executed by a
//! single-threaded scheduler in a deterministic topological order: among ready steps, the
//! one declared first runs first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Component, Environment, ProvisionError, Result};

/// A unit of work in the provisioning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Deploy a component and record its address.
    Deploy(Component),
    /// Fund the collateral valuator with fee tokens and issue an oracle request.
    FundOracle,
    /// Hand token factory ownership to the controller and register the default markets.
    ProvisionMarkets,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Deploy(component) => write!(f, "deploy {component}"),
            Step::FundOracle => f.write_str("fund oracle"),
            Step::ProvisionMarkets => f.write_str("provision markets"),
        }
    }
}

/// Gas budget of a component's deployment transaction.
pub fn deploy_budget(component: Component) -> u64 {
    match component {
        Component::EtherFactory | Component::TokenFactory => 6_000_000,
        _ => 4_000_000,
    }
}

/// A step together with the steps it must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub step: Step,
    pub after: Vec<Step>,
}

impl PlanNode {
    pub fn new(step: Step, after: impl IntoIterator<Item = Step>) -> Self {
        Self {
            step,
            after: after.into_iter().collect(),
        }
    }

    /// Components whose addresses this step consumes.
    pub fn required_components(&self) -> impl Iterator<Item = Component> + '_ {
        self.after.iter().filter_map(|step| match step {
            Step::Deploy(component) => Some(*component),
            _ => None,
        })
    }
}

/// A directed acyclic graph of provisioning steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    nodes: Vec<PlanNode>,
}

impl DeploymentPlan {
    /// Build a plan from nodes, rejecting duplicate steps and edges to unknown steps.
    pub fn new(nodes: Vec<PlanNode>) -> Result<Self> {
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|other| other.step == node.step) {
                return Err(ProvisionError::Plan(format!("duplicate step: {}", node.step)));
            }
            if let Some(unknown) = node
                .after
                .iter()
                .find(|dep| !nodes.iter().any(|n| n.step == **dep))
            {
                return Err(ProvisionError::Plan(format!(
                    "{} depends on {}, which is not part of the plan",
                    node.step, unknown
                )));
            }
        }
        Ok(Self { nodes })
    }

    /// The provisioning plan for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        use Component::*;

        let deploy = Step::Deploy;
        let mut nodes = vec![
            PlanNode::new(deploy(InterestRateModel), []),
            PlanNode::new(deploy(CollateralValuator), []),
            PlanNode::new(deploy(UnderlyingTokenValuator), []),
            PlanNode::new(deploy(EtherFactory), []),
            PlanNode::new(deploy(TokenFactory), []),
            PlanNode::new(deploy(Blacklist), []),
        ];

        let mut controller_after: Vec<Step> = Component::CONTROLLER_PREREQUISITES
            .into_iter()
            .map(deploy)
            .collect();

        if environment.runs_oracle_funding() {
            nodes.push(PlanNode::new(Step::FundOracle, [deploy(CollateralValuator)]));
            // Ordering edge only: funding produces no controller argument.
            controller_after.push(Step::FundOracle);
        }

        nodes.push(PlanNode::new(deploy(Controller), controller_after));

        if environment.runs_market_provisioning() {
            nodes.push(PlanNode::new(
                Step::ProvisionMarkets,
                [deploy(TokenFactory), deploy(Controller)],
            ));
        }

        Self { nodes }
    }

    /// The node for a step, if the plan contains it.
    pub fn node(&self, step: Step) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.step == step)
    }

    pub fn contains(&self, step: Step) -> bool {
        self.node(step).is_some()
    }

    /// Topologically sort the steps, failing if the graph has a cycle.
    pub fn execution_order(&self) -> Result<Vec<Step>> {
        let mut done = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let ready = self.nodes.iter().enumerate().find(|(i, node)| {
                !done[*i]
                    && node
                        .after
                        .iter()
                        .all(|dep| order.contains(dep))
            });

            match ready {
                Some((i, node)) => {
                    done[i] = true;
                    order.push(node.step);
                }
                None => {
                    let stuck: Vec<String> = self
                        .nodes
                        .iter()
                        .zip(&done)
                        .filter(|(_, d)| !**d)
                        .map(|(n, _)| n.step.to_string())
                        .collect();
                    return Err(ProvisionError::Plan(format!(
                        "dependency cycle between: {}",
                        stuck.join(", ")
                    )));
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Component::*;

    #[test]
    fn test_local_order() {
        let order = DeploymentPlan::for_environment(Environment::Local)
            .execution_order()
            .unwrap();

        assert_eq!(
            order,
            vec![
                Step::Deploy(InterestRateModel),
                Step::Deploy(CollateralValuator),
                Step::Deploy(UnderlyingTokenValuator),
                Step::Deploy(EtherFactory),
                Step::Deploy(TokenFactory),
                Step::Deploy(Blacklist),
                Step::Deploy(Controller),
                Step::ProvisionMarkets,
            ]
        );
    }

    #[test]
    fn test_remote_environments_fund_before_controller() {
        for env in [Environment::Testnet, Environment::Production] {
            let plan = DeploymentPlan::for_environment(env);
            let order = plan.execution_order().unwrap();

            assert!(!plan.contains(Step::ProvisionMarkets));
            assert_eq!(order[6], Step::FundOracle);
            assert_eq!(order[7], Step::Deploy(Controller));
            assert_eq!(order.len(), 8);
        }
    }

    #[test]
    fn test_controller_requires_all_prerequisites() {
        let plan = DeploymentPlan::for_environment(Environment::Testnet);
        let controller = plan.node(Step::Deploy(Controller)).unwrap();
        let required: Vec<Component> = controller.required_components().collect();
        assert_eq!(required, Component::CONTROLLER_PREREQUISITES.to_vec());
        assert!(controller.after.contains(&Step::FundOracle));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let plan = DeploymentPlan::new(vec![
            PlanNode::new(Step::Deploy(InterestRateModel), []),
            PlanNode::new(Step::Deploy(TokenFactory), [Step::Deploy(Controller)]),
            PlanNode::new(Step::Deploy(Controller), [Step::Deploy(TokenFactory)]),
        ])
        .unwrap();

        let err = plan.execution_order().unwrap_err();
        assert!(matches!(err, ProvisionError::Plan(ref msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_plan_validation() {
        assert!(
            DeploymentPlan::new(vec![PlanNode::new(
                Step::Deploy(Controller),
                [Step::Deploy(Blacklist)]
            )])
            .is_err()
        );
        assert!(
            DeploymentPlan::new(vec![
                PlanNode::new(Step::Deploy(Blacklist), []),
                PlanNode::new(Step::Deploy(Blacklist), []),
            ])
            .is_err()
        );
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let plan = DeploymentPlan::new(vec![
            PlanNode::new(Step::Deploy(Controller), [Step::Deploy(Blacklist)]),
            PlanNode::new(Step::Deploy(Blacklist), []),
            PlanNode::new(Step::Deploy(InterestRateModel), []),
        ])
        .unwrap();

        assert_eq!(
            plan.execution_order().unwrap(),
            vec![
                Step::Deploy(Blacklist),
                Step::Deploy(Controller),
                Step::Deploy(InterestRateModel),
            ]
        );
    }

    #[test]
    fn test_budgets() {
        assert_eq!(deploy_budget(InterestRateModel), 4_000_000);
        assert_eq!(deploy_budget(EtherFactory), 6_000_000);
        assert_eq!(deploy_budget(TokenFactory), 6_000_000);
        assert_eq!(deploy_budget(Controller), 4_000_000);
    }
}
