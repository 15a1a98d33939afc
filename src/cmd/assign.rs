//! Interactive app role assignment
//!
//! Walks the operator through resource application → principal type → target
//! principal → app role → confirmation, then creates the assignment. The
//! terminal is reached only through `Prompter`, the directory only through
//! `Directory`, so the whole flow runs against scripted fakes in tests.

use crate::cmd::progress;
use crate::error::{AssignerError, Result};
use crate::graph::directory::{
    AppRole, AppRoleAssignment, Directory, NewAppRoleAssignment, PrincipalKind, ServicePrincipal,
    app_id_filter,
};
use crate::tui::{TerminalKeys, TerminalView, prompts, select_with_fuzzy_filter};
use colored::Colorize;
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Interactive primitives used by the assignment flow
pub trait Prompter {
    /// Type-to-filter over `candidates`; returns ranked positions into it
    fn fuzzy_filter(&mut self, candidates: &[String], subject: &str) -> Result<Vec<usize>>;

    /// Pick one of `items`; returns its position
    fn select(&mut self, title: &str, items: &[String]) -> Result<usize>;

    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Prompter backed by the real terminal
pub struct TerminalPrompter {
    limit: usize,
}

impl TerminalPrompter {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Prompter for TerminalPrompter {
    fn fuzzy_filter(&mut self, candidates: &[String], subject: &str) -> Result<Vec<usize>> {
        let result = select_with_fuzzy_filter(
            candidates,
            subject,
            self.limit,
            &mut TerminalKeys,
            &mut TerminalView::stdout(),
        );
        prompts::clear_screen()?;
        result
    }

    fn select(&mut self, title: &str, items: &[String]) -> Result<usize> {
        let picked = prompts::select(title, items, 0)?;
        prompts::clear_screen()?;
        Ok(picked)
    }

    fn confirm(&mut self, message: &str) -> Result<bool> {
        prompts::confirm(message, false)
    }
}

/// How an assignment run ended (cancellation and failures are errors)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Assigned(AppRoleAssignment),
    AlreadyAssigned,
    Declined,
}

pub struct AppRoleAssigner<D, P> {
    directory: D,
    prompter: P,
    cancel: CancellationToken,
}

impl<D: Directory, P: Prompter> AppRoleAssigner<D, P> {
    pub fn new(directory: D, prompter: P, cancel: CancellationToken) -> Self {
        Self {
            directory,
            prompter,
            cancel,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub async fn assign(&mut self) -> Result<Outcome> {
        // Resource application
        self.checkpoint()?;
        let spinner = progress::create_spinner("Fetching applications...");
        let result = self.cancellable(self.directory.list_applications(&spinner)).await;
        let mut applications = finish_fetch(&spinner, result, "applications")?;
        applications.retain(|app| !app.app_roles.is_empty());
        if applications.is_empty() {
            return Err(AssignerError::NotFound(
                "no application in this tenant defines an app role".into(),
            ));
        }

        let labels = disambiguate(
            applications
                .iter()
                .map(|app| (app.name(), app.app_id))
                .collect(),
        );
        let picked = self.choose(
            &labels,
            "application containing the app role",
            "Select the application containing the app role:",
        )?;
        let application = &applications[picked];
        tracing::debug!("resource application {} ({})", application.name(), application.app_id);

        self.checkpoint()?;
        let resource = self.resolve_service_principal(&application.app_id).await?;

        // Target principal
        let kinds: Vec<String> = PrincipalKind::ALL.iter().map(|k| k.to_string()).collect();
        let picked = self
            .prompter
            .select("Select the type of application to assign the app role to:", &kinds)?;
        let kind = *PrincipalKind::ALL.get(picked).ok_or_else(|| out_of_range(picked))?;

        self.checkpoint()?;
        let spinner = progress::create_spinner(&format!("Fetching {} service principals...", kind));
        let filter = kind.filter();
        let result = self
            .cancellable(self.directory.list_service_principals(&filter, &spinner))
            .await;
        let principals = finish_fetch(&spinner, result, "service principals")?;
        if principals.is_empty() {
            return Err(AssignerError::NotFound(format!(
                "no {} service principals found",
                kind
            )));
        }

        let labels = disambiguate(principals.iter().map(|sp| (sp.name(), sp.app_id)).collect());
        let picked = self.choose(
            &labels,
            &format!(
                "{} that needs the app role permission to '{}'",
                kind,
                resource.name()
            ),
            &format!("Select the {} to assign the app role to:", kind),
        )?;
        let target = &principals[picked];

        // App role
        let roles: Vec<&AppRole> = resource
            .app_roles
            .iter()
            .filter(|role| role.is_assignable_to_applications())
            .collect();
        if roles.is_empty() {
            return Err(AssignerError::NotFound(format!(
                "'{}' has no enabled app roles assignable to applications",
                resource.name()
            )));
        }
        let role_labels: Vec<String> = roles.iter().map(|role| role.label()).collect();
        let picked = self
            .prompter
            .select("Select the app role to assign:", &role_labels)?;
        let role = *roles.get(picked).ok_or_else(|| out_of_range(picked))?;

        // Existing assignment
        self.checkpoint()?;
        let spinner = progress::create_spinner("Checking existing assignments...");
        let result = self
            .cancellable(self.directory.list_role_assignments(&target.id, &spinner))
            .await;
        let existing = finish_fetch(&spinner, result, "existing assignments")?;
        if existing
            .iter()
            .any(|a| a.resource_id == resource.id && a.app_role_id == role.id)
        {
            prompts::warning(&format!(
                "{} already has {} on {}",
                target.name(),
                role.label(),
                resource.name()
            ));
            return Ok(Outcome::AlreadyAssigned);
        }

        let question = format!(
            "Do you want to give {} {} {} permissions to {}?",
            target.name().bright_green(),
            kind,
            role.label().yellow(),
            resource.name().bright_blue()
        );
        if !self.prompter.confirm(&question)? {
            prompts::info("No changes made.");
            return Ok(Outcome::Declined);
        }

        self.checkpoint()?;
        let request = NewAppRoleAssignment {
            principal_id: target.id,
            resource_id: resource.id,
            app_role_id: role.id,
        };
        let created = self.directory.create_role_assignment(&request).await?;
        prompts::success(&format!(
            "Assigned {} to {} on {}",
            role.label(),
            target.name(),
            resource.name()
        ));
        Ok(Outcome::Assigned(created))
    }

    /// The service principal of an app registration, looked up by `appId`
    async fn resolve_service_principal(&self, app_id: &Uuid) -> Result<ServicePrincipal> {
        let spinner = progress::create_spinner("Fetching service principal...");
        let filter = app_id_filter(app_id);
        let result = self
            .cancellable(self.directory.list_service_principals(&filter, &spinner))
            .await;
        let mut matches = finish_fetch(&spinner, result, "service principal")?;

        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(AssignerError::NotFound(format!(
                "no service principal exists for application {}; it may need to be added to the tenant (enterprise application)",
                app_id
            ))),
            n => Err(AssignerError::Ambiguous(format!(
                "{} service principals share appId {}",
                n, app_id
            ))),
        }
    }

    /// Filter `labels`, then pick one of the filtered entries
    fn choose(&mut self, labels: &[String], subject: &str, title: &str) -> Result<usize> {
        let filtered = self.prompter.fuzzy_filter(labels, subject)?;
        if filtered.is_empty() {
            return Err(AssignerError::NotFound(format!("no {} to choose from", subject)));
        }

        let shown: Vec<String> = filtered.iter().map(|&i| labels[i].clone()).collect();
        let picked = self.prompter.select(title, &shown)?;
        filtered.get(picked).copied().ok_or_else(|| out_of_range(picked))
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AssignerError::Cancelled);
        }
        Ok(())
    }

    /// Abandon a read as soon as cancellation is requested
    async fn cancellable<T>(&self, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AssignerError::Cancelled),
            result = fetch => result,
        }
    }
}

fn out_of_range(picked: usize) -> AssignerError {
    AssignerError::NotFound(format!("selection {} is out of range", picked))
}

fn finish_fetch<T>(spinner: &ProgressBar, result: Result<Vec<T>>, what: &str) -> Result<Vec<T>> {
    match &result {
        Ok(items) => progress::finish_spinner_success(
            spinner,
            &format!("Fetched {} {}", items.len(), what),
        ),
        Err(AssignerError::Cancelled) => progress::finish_spinner_error(spinner, "Cancelled"),
        Err(_) => progress::finish_spinner_error(spinner, &format!("Failed to fetch {}", what)),
    }
    result
}

/// Display labels that stay distinguishable when names repeat
///
/// Repeated (or missing) display names get the appId appended.
pub fn disambiguate(entries: Vec<(&str, Uuid)>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (name, _) in &entries {
        *counts.entry(*name).or_default() += 1;
    }

    entries
        .iter()
        .map(|(name, app_id)| {
            if counts.get(name).copied().unwrap_or(0) > 1 {
                format!("{} ({})", name, app_id)
            } else {
                name.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_are_untouched() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(disambiguate(vec![("api", a), ("web", b)]), vec!["api", "web"]);
    }

    #[test]
    fn test_repeated_names_get_app_id() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let labels = disambiguate(vec![("api", a), ("api", b), ("web", b)]);
        assert_eq!(labels[0], format!("api ({})", a));
        assert_eq!(labels[1], format!("api ({})", b));
        assert_eq!(labels[2], "web");
    }
}
