use alloc::string::String;

use common::{
    List,
    Table,
};

use crate::task::{
    Role,
    SuspendType,
    Task,
    TaskId,
    Wait,
};

use super::{
    MailboxId,
    Message,
};

/// Почтовый ящик --- буфер на одно сообщение из четырёх слов.
///
/// Если ящик полон, все ожидающие его задачи --- отправители.
/// Если ящик пуст, все ожидающие его задачи --- получатели.
#[derive(Debug)]
pub struct Mailbox {
    /// Имя ящика.
    name: String,

    /// Порядок очереди ожидающих задач.
    suspend_type: SuspendType,

    /// Находящееся в ящике сообщение.
    pub(super) message: Option<Message>,

    /// Очередь ожидающих задач.
    pub(crate) suspension: List<TaskId>,

    /// Количество задач в очереди [`Mailbox::suspension`].
    pub(crate) tasks_waiting: usize,
}

impl Mailbox {
    /// Создаёт пустой ящик.
    pub(super) fn new(
        name: &str,
        suspend_type: SuspendType,
    ) -> Self {
        Self {
            name: name.into(),
            suspend_type,
            message: None,
            suspension: List::new(),
            tasks_waiting: 0,
        }
    }

    /// Имя ящика.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Порядок очереди ожидающих задач.
    pub fn suspend_type(&self) -> SuspendType {
        self.suspend_type
    }

    /// Сообщение, если ящик полон.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Проверяет инварианты ящика `id`.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate(
        &self,
        id: MailboxId,
        tasks: &Table<Task>,
    ) {
        self.suspension.validate(tasks);
        assert_eq!(self.suspension.len(tasks), self.tasks_waiting);

        let expected = if self.message.is_some() {
            Role::Sender
        } else {
            Role::Receiver
        };

        for task in self.suspension.iter(tasks) {
            match tasks.get(task).and_then(Task::wait) {
                Some(Wait::Mailbox { mailbox, role, .. }) => {
                    assert_eq!(*mailbox, id);
                    assert_eq!(*role, expected, "task {task} waits in a wrong role");
                },
                wait => panic!("task {task} in the mailbox {id} queue has a wait {wait:?}"),
            }
        }
    }
}
