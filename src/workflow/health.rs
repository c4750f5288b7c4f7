use super::site::Site;
use super::Orchestrator;
use crate::db::DbRole;
use crate::error::Result;
use crate::wls::{NmState, ServerState};

#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub name: String,
    pub host: String,
    /// The reported state, or the reason it could not be read.
    pub state: std::result::Result<ServerState, String>,
}

impl ServerHealth {
    pub fn is_running(&self) -> bool {
        matches!(self.state, Ok(ServerState::Running))
    }

    pub fn state_label(&self) -> String {
        match &self.state {
            Ok(s) => s.to_string(),
            Err(e) => format!("UNREACHABLE ({})", e),
        }
    }
}

/// Everything observed on one site.
#[derive(Debug, Clone)]
pub struct SiteHealth {
    pub label: String,
    pub db_unique_name: String,
    pub db_role: Option<DbRole>,
    pub node_managers: Vec<(String, NmState)>,
    pub admin: Option<ServerHealth>,
    pub managed: Vec<ServerHealth>,
    /// Set when the site could not be reached at all.
    pub error: Option<String>,
}

impl SiteHealth {
    fn unreachable(label: &str, db_unique_name: &str, error: String) -> Self {
        Self {
            label: label.to_string(),
            db_unique_name: db_unique_name.to_string(),
            db_role: None,
            node_managers: Vec::new(),
            admin: None,
            managed: Vec::new(),
            error: Some(error),
        }
    }

    fn servers(&self) -> impl Iterator<Item = &ServerHealth> {
        self.admin.iter().chain(self.managed.iter())
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub dg_status: Option<String>,
    pub sites: Vec<SiteHealth>,
}

impl HealthReport {
    /// Reasons the pair is unhealthy: Data Guard not `SUCCESS`, or any
    /// primary-side server not `RUNNING`.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match &self.dg_status {
            Some(s) if s.eq_ignore_ascii_case(crate::constants::tokens::SUCCESS) => {}
            Some(s) => problems.push(format!("Data Guard configuration status is {}", s)),
            None => problems.push("Data Guard configuration status unavailable".to_string()),
        }
        if let Some(primary) = self.sites.first() {
            if let Some(e) = &primary.error {
                problems.push(format!("{} site unreachable: {}", primary.label, e));
            }
            for server in primary.servers() {
                if !server.is_running() {
                    problems.push(format!(
                        "{} server {} on {} is {}",
                        primary.label,
                        server.name,
                        server.host,
                        server.state_label()
                    ));
                }
            }
        }
        problems
    }

    pub fn is_healthy(&self) -> bool {
        self.problems().is_empty()
    }
}

impl Orchestrator {
    /// Read-only survey of both sites.
    pub async fn health_check(&self) -> Result<HealthReport> {
        let mut report = None;
        self.scoped(async {
            report = Some(self.survey().await);
            Ok(())
        })
        .await?;
        Ok(report.unwrap_or(HealthReport {
            dg_status: None,
            sites: Vec::new(),
        }))
    }

    async fn survey(&self) -> HealthReport {
        let c = self.config();
        let mut dg_status = None;
        let mut sites = Vec::with_capacity(2);

        for (label, opened, db_name, password) in [
            ("primary", self.primary().await, &c.db_prim.db_unique_name, &c.db_prim.sysdba_password),
            ("standby", self.standby().await, &c.db_stby.db_unique_name, &c.db_stby.sysdba_password),
        ] {
            let site = match opened {
                Ok(site) => site,
                Err(e) => {
                    tracing::error!(site = label, error = %e, "Site unreachable");
                    sites.push(SiteHealth::unreachable(label, db_name, e.to_string()));
                    continue;
                }
            };
            let (health, status) = survey_site(&site, password).await;
            if dg_status.is_none() {
                dg_status = status;
            }
            sites.push(health);
        }
        HealthReport { dg_status, sites }
    }
}

async fn survey_site(site: &Site, password: &str) -> (SiteHealth, Option<String>) {
    let (db_role, status) = match site.db.dg_snapshot(site.db_unique_name(), password).await {
        Ok(snapshot) => (snapshot.role, Some(snapshot.status)),
        Err(e) => {
            tracing::warn!(site = site.label, error = %e, "Could not read Data Guard configuration");
            (None, None)
        }
    };

    let mut node_managers = Vec::with_capacity(site.node_managers.len());
    for nm in &site.node_managers {
        node_managers.push((nm.address().to_string(), nm.status().await));
    }

    let admin = ServerHealth {
        name: site.admin.name().to_string(),
        host: site.wls.admin_host.clone(),
        state: site.admin.status().await.map_err(|e| e.to_string()),
    };

    let mut managed = Vec::with_capacity(site.managed.len());
    for ms in &site.managed {
        managed.push(ServerHealth {
            name: ms.name().to_string(),
            host: ms.address().to_string(),
            state: ms.status().await.map_err(|e| e.to_string()),
        });
    }

    (
        SiteHealth {
            label: site.label.to_string(),
            db_unique_name: site.db_unique_name().to_string(),
            db_role,
            node_managers,
            admin: Some(admin),
            managed,
            error: None,
        },
        status,
    )
}
