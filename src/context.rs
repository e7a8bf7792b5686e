//! Per-run selection state: the authenticated session plus the notebook and
//! experiment the user is working on.

use thiserror::Error;

use crate::models::{Notebook, Session, TreeNode};

#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("no notebook named {0:?}")]
    NotebookNotFound(String),

    #[error("no experiment named {0:?}")]
    ExperimentNotFound(String),

    #[error("no notebook selected")]
    NoNotebook,
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub session: Session,
    pub notebook: Option<Notebook>,
    pub experiment: Option<TreeNode>,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            notebook: None,
            experiment: None,
        }
    }

    pub fn notebooks(&self) -> &[Notebook] {
        &self.session.notebooks
    }

    /// Select a notebook by name. Clears any experiment chosen in the
    /// previous notebook.
    pub fn select_notebook(&mut self, name: &str) -> Result<&Notebook, ContextError> {
        let notebook = self
            .session
            .notebooks
            .iter()
            .find(|nb| nb.name == name)
            .cloned()
            .ok_or_else(|| ContextError::NotebookNotFound(name.to_string()))?;
        self.experiment = None;
        Ok(self.notebook.insert(notebook))
    }

    /// Id of the selected notebook.
    pub fn nbid(&self) -> Result<&str, ContextError> {
        self.notebook
            .as_ref()
            .map(|nb| nb.id.as_str())
            .ok_or(ContextError::NoNotebook)
    }

    /// Select an experiment among the given folder nodes by display name.
    pub fn select_experiment(
        &mut self,
        candidates: &[TreeNode],
        name: &str,
    ) -> Result<&TreeNode, ContextError> {
        let node = candidates
            .iter()
            .find(|n| !n.is_page && n.display_text == name)
            .cloned()
            .ok_or_else(|| ContextError::ExperimentNotFound(name.to_string()))?;
        Ok(self.experiment.insert(node))
    }

    pub fn reset(&mut self) {
        self.notebook = None;
        self.experiment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SessionContext {
        SessionContext::new(Session {
            is_authenticated: true,
            user_id: Some("u1".into()),
            email: Some("a@b.com".into()),
            notebooks: vec![
                Notebook { id: "NB1".into(), name: "Main".into() },
                Notebook { id: "NB2".into(), name: "Pilot".into() },
            ],
        })
    }

    fn node(id: &str, name: &str, is_page: bool) -> TreeNode {
        TreeNode {
            tree_id: id.into(),
            display_text: name.into(),
            is_page,
        }
    }

    #[test]
    fn test_select_notebook() {
        let mut ctx = context();
        assert_eq!(ctx.nbid(), Err(ContextError::NoNotebook));
        assert_eq!(ctx.select_notebook("Pilot").unwrap().id, "NB2");
        assert_eq!(ctx.nbid(), Ok("NB2"));
        assert_eq!(
            ctx.select_notebook("Nope").unwrap_err(),
            ContextError::NotebookNotFound("Nope".into())
        );
        // Failed selection keeps the previous one
        assert_eq!(ctx.nbid(), Ok("NB2"));
    }

    #[test]
    fn test_select_experiment_ignores_pages() {
        let mut ctx = context();
        ctx.select_notebook("Main").unwrap();
        let nodes = [node("1", "Fear", true), node("2", "Fear", false)];
        assert_eq!(ctx.select_experiment(&nodes, "Fear").unwrap().tree_id, "2");

        ctx.select_notebook("Pilot").unwrap();
        assert!(ctx.experiment.is_none());

        ctx.reset();
        assert!(ctx.notebook.is_none());
    }
}
