use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{
    InMemoryLockProvider, InMemoryStockLedger, InventoryService, LeasedProductLock,
    LedgerInventoryService, LockSettings, ProductId, StockLine,
};

fn service() -> LedgerInventoryService<InMemoryStockLedger, LeasedProductLock<InMemoryLockProvider>>
{
    LedgerInventoryService::new(
        InMemoryStockLedger::new(),
        LeasedProductLock::new(
            InMemoryLockProvider::new(LockSettings::default()),
            Duration::from_secs(5),
        ),
    )
}

fn bench_reserve_release_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = service();
    let items = [StockLine::new(ProductId::new(1), 1)];
    rt.block_on(async { svc.set_stock(ProductId::new(1), 1_000).await.unwrap() });

    c.bench_function("inventory/reserve_release_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                svc.reserve(&items).await.unwrap();
                svc.release(&items).await.unwrap();
            });
        });
    });
}

fn bench_reserve_release_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = service();
    let items: Vec<StockLine> = (1..=10)
        .map(|id| StockLine::new(ProductId::new(id), 2))
        .collect();
    rt.block_on(async {
        for line in &items {
            svc.set_stock(line.product_id, 1_000).await.unwrap();
        }
    });

    c.bench_function("inventory/reserve_release_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                svc.reserve(&items).await.unwrap();
                svc.release(&items).await.unwrap();
            });
        });
    });
}

fn bench_contended_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = std::sync::Arc::new(service());
    rt.block_on(async { svc.set_stock(ProductId::new(1), 1_000).await.unwrap() });

    c.bench_function("inventory/contended_reserve_release_8_tasks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let svc = svc.clone();
                        tokio::spawn(async move {
                            let items = [StockLine::new(ProductId::new(1), 1)];
                            svc.reserve(&items).await?;
                            svc.release(&items).await
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release_single,
    bench_reserve_release_batch_10,
    bench_contended_reserve
);
criterion_main!(benches);
