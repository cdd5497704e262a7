/// Управляющий блок почтового ящика [`Mailbox`].
mod block;

use alloc::{
    string::String,
    vec::Vec,
};
use core::{
    mem,
    task::Poll,
};

use derive_getters::Getters;

use common::{
    Error,
    Id,
    Result,
    log::{
        debug,
        info,
    },
};

use crate::{
    system::Kernel,
    task::{
        Outcome,
        Role,
        Suspend,
        SuspendType,
        Task,
        TaskId,
        Wait,
    },
};

pub use block::Mailbox;

/// Сообщение почтового ящика.
pub type Message = [u32; 4];

/// Идентификатор почтового ящика.
pub type MailboxId = Id<Mailbox>;

/// Сведения о почтовом ящике.
#[derive(Clone, Debug, Eq, Getters, PartialEq)]
pub struct MailboxInfo {
    /// Имя ящика.
    name: String,

    /// Порядок очереди ожидающих задач.
    suspend_type: SuspendType,

    /// Ящик содержит сообщение.
    message_present: bool,

    /// Количество ожидающих задач.
    tasks_waiting: usize,

    /// Первая задача в очереди ожидания.
    first_task: Option<TaskId>,
}

impl Kernel {
    /// Создаёт пустой почтовый ящик.
    pub fn create_mailbox(
        &mut self,
        name: &str,
        suspend_type: SuspendType,
    ) -> MailboxId {
        let mailbox = self.protect(|kernel| kernel.mailboxes.insert(Mailbox::new(name, suspend_type)));

        info!(%mailbox, name, ?suspend_type, "create mailbox");

        mailbox
    }

    /// Удаляет ящик `mailbox`.
    /// Все ожидающие его задачи пробуждаются с ошибкой [`Error::MailboxDeleted`].
    pub fn delete_mailbox(
        &mut self,
        mailbox: MailboxId,
    ) -> Result<()> {
        self.protect(|kernel| {
            let deleted = kernel.mailboxes.remove(mailbox).ok_or(Error::InvalidMailbox)?;

            info!(%mailbox, name = deleted.name(), waiting = deleted.tasks_waiting, "delete mailbox");

            if kernel.wake_all(deleted.suspension, Err(Error::MailboxDeleted)) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            Ok(())
        })
    }

    /// Опустошает ящик `mailbox`.
    /// Все ожидающие его задачи пробуждаются с ошибкой [`Error::MailboxReset`].
    pub fn reset_mailbox(
        &mut self,
        mailbox: MailboxId,
    ) -> Result<()> {
        self.protect(|kernel| {
            let target = kernel.mailboxes.get_mut(mailbox).ok_or(Error::InvalidMailbox)?;

            info!(%mailbox, waiting = target.tasks_waiting, "reset mailbox");

            target.message = None;
            target.tasks_waiting = 0;
            let queue = mem::take(&mut target.suspension);

            if kernel.wake_all(queue, Err(Error::MailboxReset)) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            Ok(())
        })
    }

    /// Отправляет сообщение `message` в ящик `mailbox`.
    ///
    /// Если ящик пуст и его ждут получатели, сообщение получает первый из них.
    /// Если ящик пуст и никто его не ждёт, сообщение остаётся в ящике.
    /// Если ящик полон и `suspend` допускает ожидание,
    /// текущая задача встаёт в очередь ящика как отправитель и возвращается [`Poll::Pending`].
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidMailbox`] --- ящик не существует.
    ///   - [`Error::InvalidSuspend`] --- ожидание запрошено не из контекста задачи.
    ///   - [`Error::MailboxFull`] --- ящик полон, а ждать не разрешено.
    pub fn send_to_mailbox(
        &mut self,
        mailbox: MailboxId,
        message: Message,
        suspend: Suspend,
    ) -> Result<Poll<()>> {
        self.check_mailbox(mailbox, suspend)?;

        self.protect(|kernel| {
            let target = kernel.mailboxes.get_mut(mailbox).ok_or(Error::InvalidMailbox)?;

            if target.message.is_some() {
                return kernel.wait_for_mailbox(mailbox, Role::Sender, message, suspend);
            }

            match target.suspension.pop_front(&mut kernel.tasks) {
                Some(receiver) => {
                    target.tasks_waiting -= 1;

                    debug!(%mailbox, task = %receiver, ?message, "send to a waiting receiver");

                    if kernel.wake(receiver, Ok(Outcome::Received(message))) {
                        kernel.scheduler.control_to_system(&mut kernel.tasks);
                    }
                },
                None => {
                    target.message = Some(message);
                    debug!(%mailbox, ?message, "send");
                },
            }

            Ok(Poll::Ready(()))
        })
    }

    /// Рассылает сообщение `message` всем получателям, ожидающим ящик `mailbox`.
    ///
    /// Каждый получатель получает собственную копию сообщения,
    /// очередь ожидания при этом опустошается, а ящик остаётся пустым.
    /// Если получателей нет, сообщение остаётся в ящике, как при [`Kernel::send_to_mailbox()`].
    /// Если ящик полон и `suspend` допускает ожидание,
    /// текущая задача встаёт в очередь ящика как отправитель и возвращается [`Poll::Pending`].
    ///
    /// Ошибки такие же, как у [`Kernel::send_to_mailbox()`].
    pub fn broadcast_to_mailbox(
        &mut self,
        mailbox: MailboxId,
        message: Message,
        suspend: Suspend,
    ) -> Result<Poll<()>> {
        self.check_mailbox(mailbox, suspend)?;

        self.protect(|kernel| {
            let target = kernel.mailboxes.get_mut(mailbox).ok_or(Error::InvalidMailbox)?;

            if target.message.is_some() {
                return kernel.wait_for_mailbox(mailbox, Role::Sender, message, suspend);
            }

            if target.suspension.is_empty() {
                target.message = Some(message);
                debug!(%mailbox, ?message, "broadcast without receivers");
                return Ok(Poll::Ready(()));
            }

            let receivers = mem::replace(&mut target.tasks_waiting, 0);
            let queue = mem::take(&mut target.suspension);

            debug!(%mailbox, ?message, receivers, "broadcast");

            if kernel.wake_all(queue, Ok(Outcome::Received(message))) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            Ok(Poll::Ready(()))
        })
    }

    /// Забирает сообщение из ящика `mailbox`.
    ///
    /// Если сообщение ждёт своей очереди у отправителя,
    /// оно сразу занимает место забранного, а отправитель пробуждается.
    /// Если ящик пуст и `suspend` допускает ожидание,
    /// текущая задача встаёт в очередь ящика как получатель и возвращается [`Poll::Pending`].
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidMailbox`] --- ящик не существует.
    ///   - [`Error::InvalidSuspend`] --- ожидание запрошено не из контекста задачи.
    ///   - [`Error::MailboxEmpty`] --- ящик пуст, а ждать не разрешено.
    pub fn receive_from_mailbox(
        &mut self,
        mailbox: MailboxId,
        suspend: Suspend,
    ) -> Result<Poll<Message>> {
        self.check_mailbox(mailbox, suspend)?;

        self.protect(|kernel| {
            let source = kernel.mailboxes.get_mut(mailbox).ok_or(Error::InvalidMailbox)?;

            let Some(message) = source.message.take() else {
                return kernel.wait_for_mailbox(mailbox, Role::Receiver, Message::default(), suspend);
            };

            debug!(%mailbox, ?message, "receive");

            if let Some(sender) = source.suspension.pop_front(&mut kernel.tasks) {
                source.tasks_waiting -= 1;

                if let Some(Wait::Mailbox {
                    message: pending, ..
                }) = kernel.tasks.get(sender).and_then(Task::wait)
                {
                    source.message = Some(*pending);
                }

                debug!(%mailbox, task = %sender, "refill from a waiting sender");

                if kernel.wake(sender, Ok(Outcome::Sent)) {
                    kernel.scheduler.control_to_system(&mut kernel.tasks);
                }
            }

            Ok(Poll::Ready(message))
        })
    }

    /// Сведения о ящике `mailbox`.
    pub fn mailbox_information(
        &self,
        mailbox: MailboxId,
    ) -> Result<MailboxInfo> {
        let info = self.mailboxes.get(mailbox).ok_or(Error::InvalidMailbox)?;

        Ok(MailboxInfo {
            name: info.name().into(),
            suspend_type: info.suspend_type(),
            message_present: info.message.is_some(),
            tasks_waiting: info.tasks_waiting,
            first_task: info.suspension.head(),
        })
    }

    /// Количество существующих почтовых ящиков.
    pub fn established_mailboxes(&self) -> usize {
        self.mailboxes.len()
    }

    /// Идентификаторы существующих почтовых ящиков, не более `max_mailboxes` штук.
    pub fn mailbox_pointers(
        &self,
        max_mailboxes: usize,
    ) -> Vec<MailboxId> {
        self.mailboxes.ids().take(max_mailboxes).collect()
    }

    /// Почтовый ящик `mailbox`.
    pub fn mailbox(
        &self,
        mailbox: MailboxId,
    ) -> Result<&Mailbox> {
        self.mailboxes.get(mailbox).ok_or(Error::InvalidMailbox)
    }

    /// Исключает задачу `task` из очереди ожидания ящика `mailbox`.
    pub(crate) fn unlink_mailbox_waiter(
        &mut self,
        mailbox: MailboxId,
        task: TaskId,
    ) {
        if let Some(target) = self.mailboxes.get_mut(mailbox) {
            target.suspension.remove(&mut self.tasks, task);
            target.tasks_waiting -= 1;
        }
    }

    /// Проверяет аргументы операций с ящиком, ничего не меняя.
    fn check_mailbox(
        &self,
        mailbox: MailboxId,
        suspend: Suspend,
    ) -> Result<()> {
        if !self.mailboxes.contains(mailbox) {
            return Err(Error::InvalidMailbox);
        }

        self.check_suspend(suspend)
    }

    /// Ставит текущую задачу в очередь ящика `mailbox` в роли `role`.
    /// Если ждать не разрешено, возвращает ошибку того, почему ждать пришлось бы.
    fn wait_for_mailbox<T>(
        &mut self,
        mailbox: MailboxId,
        role: Role,
        message: Message,
        suspend: Suspend,
    ) -> Result<Poll<T>> {
        if !suspend.is_suspend() {
            return Err(match role {
                Role::Sender => Error::MailboxFull,
                Role::Receiver => Error::MailboxEmpty,
            });
        }

        let task = self.suspend_current(
            Wait::Mailbox {
                mailbox,
                role,
                message,
            },
            suspend,
        )?;

        let target = self.mailboxes.get_mut(mailbox).ok_or(Error::InvalidMailbox)?;
        target.suspend_type().enqueue(&mut target.suspension, &mut self.tasks, task);
        target.tasks_waiting += 1;

        debug!(%mailbox, %task, ?role, ?suspend, "wait for mailbox");

        Ok(Poll::Pending)
    }
}
