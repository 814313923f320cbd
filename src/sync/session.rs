//! Edit session state machine shared by every view with a dialog.
//!
//! `Idle -> Editing | Creating -> Submitting -> Idle`. A failed submit returns
//! to the state it came from with the draft intact.

use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum EditState<D> {
    Idle,
    Editing {
        id: Uuid,
        draft: D,
    },
    Creating {
        draft: D,
    },
    Submitting {
        previous: Box<EditState<D>>,
    },
}

impl<D> Default for EditState<D> {
    fn default() -> Self {
        EditState::Idle
    }
}

/// What a submit should do with the draft.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<D> {
    Create(D),
    Update(Uuid, D),
}

#[derive(Debug, Clone)]
pub struct EditSession<D> {
    state: EditState<D>,
}

impl<D> Default for EditSession<D> {
    fn default() -> Self {
        Self {
            state: EditState::Idle,
        }
    }
}

impl<D: Clone> EditSession<D> {
    pub fn new() -> Self {
        Self {
            state: EditState::Idle,
        }
    }

    pub fn state(&self) -> &EditState<D> {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, EditState::Idle)
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, EditState::Submitting { .. })
    }

    pub fn open_edit(&mut self, id: Uuid, draft: D) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.state = EditState::Editing { id, draft };
        Ok(())
    }

    pub fn open_create(&mut self, draft: D) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.state = EditState::Creating { draft };
        Ok(())
    }

    pub fn draft(&self) -> Option<&D> {
        match &self.state {
            EditState::Editing { draft, .. } | EditState::Creating { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut D> {
        match &mut self.state {
            EditState::Editing { draft, .. } | EditState::Creating { draft } => Some(draft),
            _ => None,
        }
    }

    /// Close the dialog. Ignored while a submit is in flight.
    pub fn cancel(&mut self) {
        if !self.is_submitting() {
            self.state = EditState::Idle;
        }
    }

    pub fn begin_submit(&mut self) -> Result<Submission<D>, AppError> {
        let submission = match &self.state {
            EditState::Editing { id, draft } => Submission::Update(*id, draft.clone()),
            EditState::Creating { draft } => Submission::Create(draft.clone()),
            EditState::Idle => {
                return Err(AppError::Validation("Nothing to submit".to_string()))
            }
            EditState::Submitting { .. } => {
                return Err(AppError::Validation("Already submitting".to_string()))
            }
        };

        let previous = std::mem::take(&mut self.state);
        self.state = EditState::Submitting {
            previous: Box::new(previous),
        };
        Ok(submission)
    }

    /// Success closes the session; failure reopens it with the draft kept.
    pub fn finish_submit(&mut self, succeeded: bool) {
        let EditState::Submitting { previous } = std::mem::take(&mut self.state) else {
            return;
        };
        if !succeeded {
            self.state = *previous;
        }
    }

    fn ensure_idle(&self) -> Result<(), AppError> {
        if self.is_open() {
            return Err(AppError::Validation(
                "Finish or cancel the open edit first".to_string(),
            ));
        }
        Ok(())
    }
}
