use alloc::{
    collections::BTreeMap,
    string::String,
};

use common::{
    List,
    Table,
    log::trace,
};

use crate::task::{
    SuspendType,
    Task,
    TaskId,
};

use super::{
    PoolId,
    header::{
        Address,
        HEADER_SIZE,
        Header,
    },
};

/// Пул динамической памяти.
///
/// Управляет областью адресов `[start_address, start_address + pool_size)`,
/// разделённой на идущие подряд блоки с заголовками.
/// Каждый блок либо занят, либо свободен и стоит в списке свободных блоков.
/// Никакие два физически соседних блока не бывают свободны одновременно ---
/// освобождаемый блок сливается с соседями.
///
/// Последние [`HEADER_SIZE`] байт пула занимает замыкающий блок.
/// Он всегда занят и не даёт слить последний блок пула с первым.
#[derive(Debug)]
pub struct MemoryPool {
    /// Идентификатор пула, который записывается в заголовок каждого блока.
    id: PoolId,

    /// Имя пула.
    name: String,

    /// Начало управляемой области.
    start_address: Address,

    /// Размер управляемой области.
    pool_size: usize,

    /// Минимальный размер блока, который может остаться после расщепления.
    min_allocation: usize,

    /// Порядок очереди ожидающих задач.
    suspend_type: SuspendType,

    /// Суммарный размер полезной нагрузки свободных блоков.
    available: usize,

    /// Заголовки блоков по их смещению от начала пула.
    headers: BTreeMap<usize, Header>,

    /// Список свободных блоков.
    /// Его голова --- последний затронутый освобождением блок,
    /// с неё начинается поиск при выделении.
    free: List<usize>,

    /// Очередь задач, ожидающих память.
    pub(crate) suspension: List<TaskId>,

    /// Количество задач в очереди [`MemoryPool::suspension`].
    pub(crate) tasks_waiting: usize,
}

impl MemoryPool {
    /// Создаёт пул из одного свободного блока на всю область и замыкающего блока.
    pub(super) fn new(
        id: PoolId,
        name: &str,
        start_address: Address,
        pool_size: usize,
        min_allocation: usize,
        suspend_type: SuspendType,
    ) -> Self {
        let trailer = pool_size - HEADER_SIZE;

        let mut headers = BTreeMap::new();
        headers.insert(0, Header::new(id, 0, true, trailer, trailer));
        headers.insert(trailer, Header::new(id, trailer, false, 0, 0));

        let mut free = List::new();
        free.push_back(&mut headers, 0);

        Self {
            id,
            name: name.into(),
            start_address,
            pool_size,
            min_allocation,
            suspend_type,
            available: pool_size - 2 * HEADER_SIZE,
            headers,
            free,
            suspension: List::new(),
            tasks_waiting: 0,
        }
    }

    /// Имя пула.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Начало управляемой области.
    pub fn start_address(&self) -> Address {
        self.start_address
    }

    /// Размер управляемой области.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Минимальный размер блока.
    pub fn min_allocation(&self) -> usize {
        self.min_allocation
    }

    /// Суммарный размер свободной памяти, доступной для выделения.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Порядок очереди ожидающих задач.
    pub fn suspend_type(&self) -> SuspendType {
        self.suspend_type
    }

    /// Количество свободных блоков.
    pub fn free_blocks(&self) -> usize {
        self.free.len(&self.headers)
    }

    /// Возвращает `true`, если `address` лежит в управляемой пулом области.
    pub(super) fn contains(
        &self,
        address: Address,
    ) -> bool {
        let address = address.into_usize();
        let start = self.start_address.into_usize();

        start <= address && address - start < self.pool_size
    }

    /// Возвращает `true`, если область `[start, start + size)` пересекается с областью пула.
    pub(super) fn overlaps(
        &self,
        start: Address,
        size: usize,
    ) -> bool {
        let start = start.into_usize();
        let end = start.saturating_add(size);
        let pool_start = self.start_address.into_usize();
        let pool_end = pool_start + self.pool_size;

        start < pool_end && pool_start < end
    }

    /// Заголовок блока, полезная нагрузка которого начинается по адресу `address`.
    /// Возвращает смещение блока и его заголовок.
    pub(super) fn block(
        &self,
        address: Address,
    ) -> Option<(usize, &Header)> {
        let offset = address
            .into_usize()
            .checked_sub(self.start_address.into_usize() + HEADER_SIZE)?;

        if offset + HEADER_SIZE >= self.pool_size {
            return None;
        }

        self.headers.get(&offset).map(|header| (offset, header))
    }

    /// Выделяет блок размера `size`, полезная нагрузка которого выровнена на `alignment`.
    /// Размер и выравнивание уже округлены до [`super::WORD`],
    /// нулевое выравнивание означает отсутствие требований к нему.
    ///
    /// Ищет первый подходящий блок, начиная с головы списка свободных блоков.
    /// Если блок не выровнен, отщепляет от него спереди свободный блок.
    /// Если остаток блока вмещает ещё один заголовок и минимальный блок,
    /// отщепляет его сзади как свободный.
    ///
    /// Возвращает [`None`], если подходящего блока нет.
    pub(super) fn allocate(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> Option<Address> {
        let (mut offset, front) = self.free.iter(&self.headers).find_map(|offset| {
            let block_size = self.block_size(offset);
            let front = self.front_split(offset, alignment)?;

            (front.checked_add(size)? <= block_size).then_some((offset, front))
        })?;

        if front > 0 {
            offset = self.split(offset, front);
            self.available -= HEADER_SIZE;
        }

        let block_size = self.block_size(offset);

        if block_size >= size + HEADER_SIZE + self.min_allocation {
            self.split(offset, size + HEADER_SIZE);
            self.available -= size + HEADER_SIZE;
        } else {
            self.available -= block_size;
        }

        self.header_mut(offset).free = false;
        self.free.remove(&mut self.headers, offset);

        let address = self.address(offset);

        trace!(pool = %self.id, %address, size, alignment, available = self.available, "allocate");

        Some(address)
    }

    /// Освобождает занятый блок со смещением `offset` и сливает его со свободными соседями.
    /// Слитый блок становится головой списка свободных блоков.
    pub(super) fn release(
        &mut self,
        offset: usize,
    ) {
        let mut block = offset;
        let mut listed = false;

        self.available += self.block_size(block);
        self.header_mut(block).free = true;

        let previous = self.headers[&block].previous_memory;
        if self.headers[&previous].free {
            self.absorb(previous, block);
            block = previous;
            listed = true;
        }

        let next = self.headers[&block].next_memory;
        if self.headers[&next].free {
            self.free.remove(&mut self.headers, next);
            self.absorb(block, next);
        }

        if !listed {
            self.free.push_back(&mut self.headers, block);
        }
        self.free.set_head(block);

        trace!(
            pool = %self.id,
            address = %self.address(offset),
            merged = %self.address(block),
            available = self.available,
            "release",
        );
    }

    /// Проверяет инварианты пула.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate(
        &self,
        tasks: &Table<Task>,
    ) {
        let trailer = self.pool_size - HEADER_SIZE;

        let mut block = 0;
        let mut blocks = 0;
        let mut free_blocks = 0;
        let mut free_size = 0;

        while block != trailer {
            let header = &self.headers[&block];
            let next = header.next_memory;

            assert!(block < next, "block {block} is not followed by a later block");
            assert_eq!(self.headers[&next].previous_memory, block);
            assert_eq!(header.pool, self.id);

            if header.free {
                assert!(!self.headers[&next].free, "adjacent free blocks {block} and {next}");
                free_blocks += 1;
                free_size += self.block_size(block);
            }

            blocks += 1;
            block = next;
        }

        let last = &self.headers[&trailer];
        assert!(!last.free);
        assert_eq!(last.next_memory, 0);
        assert_eq!(self.headers[&0].previous_memory, trailer);

        assert_eq!(blocks + 1, self.headers.len(), "headers outside of the block chain");
        assert_eq!(free_size, self.available);

        self.free.validate(&self.headers);
        assert_eq!(self.free.len(&self.headers), free_blocks);
        for block in self.free.iter(&self.headers) {
            assert!(self.headers[&block].free);
        }

        self.suspension.validate(tasks);
        assert_eq!(self.suspension.len(tasks), self.tasks_waiting);
    }

    /// Адрес полезной нагрузки блока со смещением `offset`.
    fn address(
        &self,
        offset: usize,
    ) -> Address {
        Address::new(self.start_address.into_usize() + offset + HEADER_SIZE)
    }

    /// Размер полезной нагрузки блока со смещением `offset`.
    fn block_size(
        &self,
        offset: usize,
    ) -> usize {
        self.headers[&offset].next_memory - offset - HEADER_SIZE
    }

    /// Размер свободного блока, который нужно отщепить спереди от блока `offset`,
    /// чтобы полезная нагрузка остатка была выровнена на `alignment`.
    /// Отщеплённый блок должен вмещать два заголовка и минимальный блок.
    fn front_split(
        &self,
        offset: usize,
        alignment: usize,
    ) -> Option<usize> {
        let address = self.address(offset).into_usize();

        if address % alignment.max(1) == 0 {
            return Some(0);
        }

        let reserve = 2 * HEADER_SIZE + self.min_allocation;
        let split = address.checked_next_multiple_of(alignment)? - address;

        if split >= reserve {
            Some(split)
        } else {
            Some((address + reserve).checked_next_multiple_of(alignment)? - address)
        }
    }

    /// Расщепляет свободный блок `offset` на два свободных блока,
    /// второй из которых начинается со смещения `offset + at`.
    /// Второй блок встаёт в список свободных блоков сразу за первым.
    fn split(
        &mut self,
        offset: usize,
        at: usize,
    ) -> usize {
        let new = offset + at;
        let next = self.headers[&offset].next_memory;

        self.headers.insert(new, Header::new(self.id, new, true, offset, next));
        self.header_mut(next).previous_memory = new;
        self.header_mut(offset).next_memory = new;

        self.free.insert_after(&mut self.headers, offset, new);

        new
    }

    /// Присоединяет блок `next` к физически предшествующему ему блоку `block`.
    /// Блок `next` к этому моменту не стоит в списке свободных блоков.
    fn absorb(
        &mut self,
        block: usize,
        next: usize,
    ) {
        let after = self.headers[&next].next_memory;

        self.header_mut(block).next_memory = after;
        self.header_mut(after).previous_memory = block;
        self.headers.remove(&next);

        self.available += HEADER_SIZE;
    }

    /// Заголовок блока `offset`, доступный на запись.
    fn header_mut(
        &mut self,
        offset: usize,
    ) -> &mut Header {
        self.headers
            .get_mut(&offset)
            .unwrap_or_else(|| panic!("no block header at offset {offset}"))
    }
}
