/// Адрес [`Address`] и заголовок блока памяти.
mod header;

/// Пул динамической памяти [`MemoryPool`].
mod pool;

use alloc::{
    string::String,
    vec::Vec,
};
use core::task::Poll;

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
        Suspend,
        SuspendType,
        Task,
        TaskId,
        Wait,
    },
};

pub use header::{
    Address,
    HEADER_SIZE,
    MIN_ALLOCATION,
    WORD,
};
pub use pool::MemoryPool;

use header::adjusted_size;

/// Идентификатор пула динамической памяти.
pub type PoolId = Id<MemoryPool>;

/// Сведения о пуле динамической памяти.
#[derive(Clone, Debug, Eq, Getters, PartialEq)]
pub struct MemoryPoolInfo {
    /// Имя пула.
    name: String,

    /// Начало управляемой пулом области.
    start_address: Address,

    /// Размер управляемой пулом области.
    pool_size: usize,

    /// Минимальный размер блока.
    min_allocation: usize,

    /// Суммарный размер свободной памяти.
    available: usize,

    /// Порядок очереди ожидающих задач.
    suspend_type: SuspendType,

    /// Количество ожидающих задач.
    tasks_waiting: usize,

    /// Первая задача в очереди ожидания.
    first_task: Option<TaskId>,
}

impl Kernel {
    /// Создаёт пул динамической памяти, управляющий областью
    /// `[start_address, start_address + pool_size)`.
    ///
    /// Размер пула округляется вниз, а `min_allocation` --- вверх до кратного [`WORD`].
    /// Ненулевой `min_allocation` меньше [`MIN_ALLOCATION`] поднимается до [`MIN_ALLOCATION`].
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidMemory`] --- нулевой `start_address` или пересечение с другим пулом.
    ///   - [`Error::NotAligned`] --- `start_address` не выровнен на [`WORD`].
    ///   - [`Error::InvalidSize`] --- нулевой `min_allocation` или пул,
    ///     который не вмещает двух заголовков и минимального блока.
    pub fn create_memory_pool(
        &mut self,
        name: &str,
        start_address: Address,
        pool_size: usize,
        min_allocation: usize,
        suspend_type: SuspendType,
    ) -> Result<PoolId> {
        if start_address.is_null() {
            return Err(Error::InvalidMemory);
        }

        if !start_address.is_aligned(WORD) {
            return Err(Error::NotAligned);
        }

        if min_allocation == 0 {
            return Err(Error::InvalidSize);
        }

        let pool_size = pool_size - pool_size % WORD;
        let min_allocation =
            adjusted_size(min_allocation).ok_or(Error::InvalidSize)?.max(MIN_ALLOCATION);

        if min_allocation
            .checked_add(2 * HEADER_SIZE)
            .is_none_or(|required| required > pool_size)
        {
            return Err(Error::InvalidSize);
        }

        if start_address.into_usize().checked_add(pool_size).is_none() ||
            self.pools.iter().any(|(_, pool)| pool.overlaps(start_address, pool_size))
        {
            return Err(Error::InvalidMemory);
        }

        let pool = self.protect(|kernel| {
            kernel.pools.insert_with(|id| {
                MemoryPool::new(
                    id,
                    name,
                    start_address,
                    pool_size,
                    min_allocation,
                    suspend_type,
                )
            })
        });

        info!(%pool, name, %start_address, pool_size, min_allocation, ?suspend_type, "create memory pool");

        Ok(pool)
    }

    /// Удаляет пул `pool`.
    /// Все ожидающие его задачи пробуждаются с ошибкой [`Error::PoolDeleted`].
    pub fn delete_memory_pool(
        &mut self,
        pool: PoolId,
    ) -> Result<()> {
        self.protect(|kernel| {
            let deleted = kernel.pools.remove(pool).ok_or(Error::InvalidPool)?;

            info!(%pool, name = deleted.name(), waiting = deleted.tasks_waiting, "delete memory pool");

            if kernel.wake_all(deleted.suspension, Err(Error::PoolDeleted)) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            Ok(())
        })
    }

    /// Выделяет из пула `pool` блок размера `size` без требований к выравниванию.
    /// См. [`Kernel::allocate_aligned_memory()`].
    pub fn allocate_memory(
        &mut self,
        pool: PoolId,
        size: usize,
        suspend: Suspend,
    ) -> Result<Poll<Address>> {
        self.allocate_aligned_memory(pool, size, 0, suspend)
    }

    /// Выделяет из пула `pool` блок размера `size`,
    /// адрес которого выровнен на `alignment`.
    /// Размер и выравнивание округляются вверх до кратного [`WORD`],
    /// а размер меньше минимального блока пула поднимается до него.
    ///
    /// Если памяти недостаточно и `suspend` допускает ожидание,
    /// текущая задача встаёт в очередь ожидания пула и возвращается [`Poll::Pending`].
    /// Выделенный ей позже адрес забирается через [`Kernel::resume_status()`].
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidPool`] --- пул не существует.
    ///   - [`Error::InvalidSize`] --- нулевой `size` или `size`, превышающий размер пула
    ///     за вычетом двух заголовков.
    ///   - [`Error::InvalidSuspend`] --- ожидание запрошено не из контекста задачи.
    ///   - [`Error::NoMemory`] --- памяти недостаточно, а ждать не разрешено.
    pub fn allocate_aligned_memory(
        &mut self,
        pool: PoolId,
        size: usize,
        alignment: usize,
        suspend: Suspend,
    ) -> Result<Poll<Address>> {
        let (pool_size, min_allocation) = self
            .pools
            .get(pool)
            .map(|memory| (memory.pool_size(), memory.min_allocation()))
            .ok_or(Error::InvalidPool)?;

        if size == 0 || size > pool_size - 2 * HEADER_SIZE {
            return Err(Error::InvalidSize);
        }

        self.check_suspend(suspend)?;

        let size = adjusted_size(size).ok_or(Error::InvalidSize)?.max(min_allocation);
        let alignment = adjusted_size(alignment).ok_or(Error::InvalidSize)?;

        self.protect(|kernel| {
            let memory = kernel.pools.get_mut(pool).ok_or(Error::InvalidPool)?;

            if let Some(address) = memory.allocate(size, alignment) {
                debug!(%pool, %address, size, alignment, "allocate memory");
                return Ok(Poll::Ready(address));
            }

            if !suspend.is_suspend() {
                debug!(%pool, size, alignment, available = memory.available(), "no memory");
                return Err(Error::NoMemory);
            }

            let task = kernel.suspend_current(
                Wait::Memory {
                    pool,
                    size,
                    alignment,
                },
                suspend,
            )?;

            let memory = kernel.pools.get_mut(pool).ok_or(Error::InvalidPool)?;
            memory.suspend_type().enqueue(&mut memory.suspension, &mut kernel.tasks, task);
            memory.tasks_waiting += 1;

            debug!(%pool, %task, size, alignment, ?suspend, "wait for memory");

            Ok(Poll::Pending)
        })
    }

    /// Возвращает в пул блок с адресом `address`.
    ///
    /// Сливает освобождённый блок со свободными соседями,
    /// после чего пытается выполнить запросы ожидающих пул задач в порядке их очереди.
    /// Обход очереди останавливается на первом запросе, который выполнить не удалось,
    /// даже если следующие за ним запросы меньше.
    ///
    /// Возвращает ошибку [`Error::InvalidPointer`], если `address` не является адресом
    /// занятого блока существующего пула. В этом случае ничего не меняется.
    pub fn deallocate_memory(
        &mut self,
        address: Address,
    ) -> Result<()> {
        let (pool, offset) = self.find_block(address)?;

        self.protect(|kernel| {
            kernel.pools.get_mut(pool).ok_or(Error::InvalidPointer)?.release(offset);

            debug!(%pool, %address, "deallocate memory");

            if kernel.retry_memory_waiters(pool) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            Ok(())
        })
    }

    /// Сведения о пуле `pool`.
    pub fn memory_pool_information(
        &self,
        pool: PoolId,
    ) -> Result<MemoryPoolInfo> {
        let memory = self.pools.get(pool).ok_or(Error::InvalidPool)?;

        Ok(MemoryPoolInfo {
            name: memory.name().into(),
            start_address: memory.start_address(),
            pool_size: memory.pool_size(),
            min_allocation: memory.min_allocation(),
            available: memory.available(),
            suspend_type: memory.suspend_type(),
            tasks_waiting: memory.tasks_waiting,
            first_task: memory.suspension.head(),
        })
    }

    /// Количество существующих пулов памяти.
    pub fn established_memory_pools(&self) -> usize {
        self.pools.len()
    }

    /// Идентификаторы существующих пулов памяти, не более `max_pools` штук.
    pub fn memory_pool_pointers(
        &self,
        max_pools: usize,
    ) -> Vec<PoolId> {
        self.pools.ids().take(max_pools).collect()
    }

    /// Пул памяти `pool`.
    pub fn memory_pool(
        &self,
        pool: PoolId,
    ) -> Result<&MemoryPool> {
        self.pools.get(pool).ok_or(Error::InvalidPool)
    }

    /// Находит занятый блок по адресу его полезной нагрузки.
    /// Ничего не меняет, любая неудача проверки даёт [`Error::InvalidPointer`].
    fn find_block(
        &self,
        address: Address,
    ) -> Result<(PoolId, usize)> {
        if address.is_null() {
            return Err(Error::InvalidPointer);
        }

        let (pool, memory) = self
            .pools
            .iter()
            .find(|(_, memory)| memory.contains(address))
            .ok_or(Error::InvalidPointer)?;

        let (offset, header) = memory.block(address).ok_or(Error::InvalidPointer)?;

        if header.pool != pool || !self.pools.contains(header.pool) || header.free {
            return Err(Error::InvalidPointer);
        }

        Ok((pool, offset))
    }

    /// Выполняет запросы задач, ожидающих память в пуле `pool`, в порядке очереди.
    /// Останавливается на первом невыполнимом запросе.
    ///
    /// Возвращает `true`, если какая-либо из пробуждённых задач должна вытеснить текущую.
    fn retry_memory_waiters(
        &mut self,
        pool: PoolId,
    ) -> bool {
        let mut preempt = false;

        while let Some(memory) = self.pools.get_mut(pool) {
            let Some(task) = memory.suspension.head() else {
                break;
            };

            let Some(Wait::Memory {
                size,
                alignment,
                ..
            }) = self.tasks.get(task).and_then(Task::wait).copied()
            else {
                break;
            };

            let Some(address) = memory.allocate(size, alignment) else {
                debug!(%pool, %task, size, alignment, "memory waiter is still blocked");
                break;
            };

            memory.suspension.remove(&mut self.tasks, task);
            memory.tasks_waiting -= 1;

            preempt |= self.wake(task, Ok(Outcome::Allocated(address)));
        }

        preempt
    }

    /// Исключает задачу `task` из очереди ожидания пула `pool`.
    pub(crate) fn unlink_memory_waiter(
        &mut self,
        pool: PoolId,
        task: TaskId,
    ) {
        if let Some(memory) = self.pools.get_mut(pool) {
            memory.suspension.remove(&mut self.tasks, task);
            memory.tasks_waiting -= 1;
        }
    }
}
