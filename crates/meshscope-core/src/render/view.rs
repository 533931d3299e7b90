//! The fixed registry of views.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::report::{Report, TopologyKind};

use super::detail::parents;
use super::mapping::*;
use super::{Map, Reduce, RenderableNodes, Renderer, TopologySelector};

/// A named rendering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    Applications,
    ApplicationsByName,
    Containers,
    ContainersByImage,
    Hosts,
    Pods,
    PodsByService,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Applications,
        View::ApplicationsByName,
        View::Containers,
        View::ContainersByImage,
        View::Hosts,
        View::Pods,
        View::PodsByService,
    ];

    /// URL name, e.g. `containers-by-image`.
    pub fn name(self) -> &'static str {
        match self {
            View::Applications => "applications",
            View::ApplicationsByName => "applications-by-name",
            View::Containers => "containers",
            View::ContainersByImage => "containers-by-image",
            View::Hosts => "hosts",
            View::Pods => "pods",
            View::PodsByService => "pods-by-service",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            View::Applications => "Applications",
            View::ApplicationsByName => "by name",
            View::Containers => "Containers",
            View::ContainersByImage => "by image",
            View::Hosts => "Hosts",
            View::Pods => "Pods",
            View::PodsByService => "by service",
        }
    }

    /// The top-level view a grouping view belongs under.
    pub fn parent(self) -> Option<View> {
        match self {
            View::ApplicationsByName => Some(View::Applications),
            View::ContainersByImage => Some(View::Containers),
            View::PodsByService => Some(View::Pods),
            _ => None,
        }
    }

    pub fn renderer(self) -> Box<dyn Renderer> {
        match self {
            View::Applications => Box::new(process_renderer()),
            View::ApplicationsByName => Box::new(Map::new(
                map_count_processes,
                Map::new(map_process_to_name, process_renderer()),
            )),
            View::Containers => Box::new(container_renderer()),
            View::ContainersByImage => Box::new(Map::new(
                map_count_containers,
                Reduce(vec![
                    Box::new(Map::new(map_container_to_image, container_renderer())),
                    Box::new(Map::new(
                        map_container_image_identity,
                        TopologySelector(TopologyKind::ContainerImage),
                    )),
                ]),
            )),
            View::Hosts => Box::new(Reduce(vec![
                Box::new(Map::new(
                    map_address_to_host,
                    Map::new(map_address_identity, TopologySelector(TopologyKind::Address)),
                )),
                Box::new(Map::new(map_host_identity, TopologySelector(TopologyKind::Host))),
            ])),
            View::Pods => Box::new(Map::new(map_count_containers, pod_renderer())),
            View::PodsByService => Box::new(Map::new(
                map_count_pods,
                Reduce(vec![
                    Box::new(Map::new(map_pod_to_service, pod_renderer())),
                    Box::new(Map::new(map_service_identity, TopologySelector(TopologyKind::Service))),
                ]),
            )),
        }
    }

    /// Render `rpt` and fill in each real node's parent chain.
    pub fn render(self, rpt: &Report) -> RenderableNodes {
        let mut nodes = self.renderer().render(rpt);
        for node in nodes.values_mut() {
            if node.pseudo {
                continue;
            }
            node.parents = parents(rpt, node).into_iter().map(|p| p.id).collect();
        }
        log::debug!("rendered {} nodes for {self}", nodes.len());
        nodes
    }
}

fn process_renderer() -> Reduce {
    Reduce(vec![
        Box::new(Map::new(
            map_endpoint_to_process,
            Map::new(map_endpoint_identity, TopologySelector(TopologyKind::Endpoint)),
        )),
        Box::new(Map::new(map_process_identity, TopologySelector(TopologyKind::Process))),
    ])
}

fn container_renderer() -> Reduce {
    Reduce(vec![
        Box::new(Map::new(map_process_to_container, process_renderer())),
        Box::new(Map::new(map_container_identity, TopologySelector(TopologyKind::Container))),
    ])
}

/// Pods, before counting containers.
fn pod_renderer() -> Reduce {
    Reduce(vec![
        Box::new(Map::new(map_container_to_pod, container_renderer())),
        Box::new(Map::new(map_pod_identity, TopologySelector(TopologyKind::Pod))),
    ])
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| format!("unknown view: {s}"))
    }
}
