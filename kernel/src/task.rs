use alloc::string::String;
use core::fmt;

use common::{
    Id,
    Link,
    List,
    Node,
    Priority,
    Result,
    Table,
};

use crate::{
    mailbox::{
        MailboxId,
        Message,
    },
    memory::{
        Address,
        PoolId,
    },
};

/// Идентификатор задачи.
pub type TaskId = Id<Task>;

/// Состояние задачи.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Задача готова к исполнению и стоит в очереди готовых задач.
    Ready,

    /// Задача исполняется.
    Running,

    /// Задача ожидает объект ядра.
    Suspended(SuspendReason),

    /// Задача завершена принудительно.
    Terminated,
}

/// Объект ядра, который ожидает задача.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SuspendReason {
    /// Ожидание памяти в пуле.
    Memory,

    /// Ожидание почтового ящика.
    Mailbox,
}

/// Параметр ожидания для блокирующих операций.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Suspend {
    /// Не ждать, сразу вернуть ошибку.
    NoSuspend,

    /// Ждать без ограничения по времени.
    Forever,

    /// Ждать не более заданного количества тиков.
    /// Нулевой тайм-аут равносилен [`Suspend::NoSuspend`].
    Timeout(u64),
}

impl Suspend {
    /// Возвращает `true`, если вызывающая задача готова ждать.
    pub fn is_suspend(&self) -> bool {
        !matches!(self, Suspend::NoSuspend | Suspend::Timeout(0))
    }
}

/// Порядок, в котором ожидающие объект задачи выстраиваются в очередь.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SuspendType {
    /// В порядке поступления.
    Fifo,

    /// По приоритету задач, в порядке поступления среди задач равного приоритета.
    Priority,
}

impl SuspendType {
    /// Ставит задачу `task` в очередь ожидания `queue` в соответствии с этим порядком.
    pub(crate) fn enqueue(
        self,
        queue: &mut List<TaskId>,
        tasks: &mut Table<Task>,
        task: TaskId,
    ) {
        match self {
            SuspendType::Fifo => queue.push_back(tasks, task),
            SuspendType::Priority => queue.insert_by_priority(tasks, task),
        }
    }
}

/// Результат, которым завершилось ожидание задачи.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Задаче выделен блок памяти.
    Allocated(Address),

    /// Задача получила сообщение.
    Received(Message),

    /// Сообщение задачи помещено в почтовый ящик.
    Sent,
}

/// Роль задачи, ожидающей почтовый ящик.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Задача ждёт, когда в ящике освободится место для её сообщения.
    Sender,

    /// Задача ждёт сообщения.
    Receiver,
}

/// Блок ожидания задачи --- запрос, который будет выполнен при её пробуждении.
///
/// Принадлежит ожидающей задаче и существует только пока она ждёт.
/// Сама задача при этом находится в очереди ожидания объекта,
/// который указан в блоке ожидания.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wait {
    /// Ожидание памяти.
    Memory {
        /// Пул памяти.
        pool: PoolId,

        /// Запрошенный размер, уже выровненный пулом.
        size: usize,

        /// Запрошенное выравнивание, `0` --- без требований к выравниванию.
        alignment: usize,
    },

    /// Ожидание почтового ящика.
    Mailbox {
        /// Почтовый ящик.
        mailbox: MailboxId,

        /// Роль ожидающей задачи.
        role: Role,

        /// Сообщение отправителя.
        /// Для получателя не используется, полученное сообщение
        /// передаётся в [`Outcome::Received`].
        message: Message,
    },
}

impl Wait {
    /// Причина ожидания.
    pub fn reason(&self) -> SuspendReason {
        match self {
            Wait::Memory { .. } => SuspendReason::Memory,
            Wait::Mailbox { .. } => SuspendReason::Mailbox,
        }
    }
}

/// Задача.
#[derive(Debug)]
pub struct Task {
    /// Имя задачи.
    name: String,

    /// Приоритет задачи, меньшее значение --- более срочная задача.
    priority: Priority,

    /// Состояние задачи.
    pub(crate) state: State,

    /// Звено очереди, в которой стоит задача.
    /// Готовая задача стоит в очереди готовых задач,
    /// ожидающая --- в очереди ожидания ровно одного объекта.
    link: Link<TaskId>,

    /// Блок ожидания, пока задача ждёт.
    pub(crate) wait: Option<Wait>,

    /// Тик, на котором истекает ожидание.
    pub(crate) deadline: Option<u64>,

    /// Результат ожидания, который записал разбудивший задачу код.
    pub(crate) status: Option<Result<Outcome>>,
}

impl Task {
    /// Создаёт готовую к исполнению задачу с идентификатором `id`.
    pub(crate) fn new(
        id: TaskId,
        name: &str,
        priority: Priority,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            state: State::Ready,
            link: Link::new(id, priority),
            wait: None,
            deadline: None,
            status: None,
        }
    }

    /// Имя задачи.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Приоритет задачи.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Состояние задачи.
    pub fn state(&self) -> State {
        self.state
    }

    /// Блок ожидания, если задача ждёт.
    pub fn wait(&self) -> Option<&Wait> {
        self.wait.as_ref()
    }
}

impl Node<TaskId> for Task {
    fn link(&self) -> &Link<TaskId> {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link<TaskId> {
        &mut self.link
    }
}

impl fmt::Display for Task {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ name: {}, priority: {}, state: {:?} }}",
            self.name, self.priority, self.state,
        )
    }
}
