use std::ptr::NonNull;

use rcollector::{GcContext, StepOutcome, word::WORD};

const MESHES: usize = 6;

/// Stores `to` at word slot `slot` of `from`.
unsafe fn link(
  from: NonNull<u8>,
  slot: usize,
  to: *const u8,
) {
  unsafe { (from.as_ptr().add(slot * WORD) as *mut usize).write_unaligned(to as usize) };
}

/// Stand-in for a GPU buffer owned by the renderer.
fn create_gpu_handle(id: u32) -> *mut u8 {
  Box::into_raw(Box::new(id)) as *mut u8
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

  let mut ctx = GcContext::new();

  // --------------------------------------------------------------------
  // 1) The scene is the first allocation, so it is the root. It has one
  //    word slot per mesh.
  // --------------------------------------------------------------------
  let scene = ctx.allocate(MESHES * WORD).expect("allocate scene");
  println!("[1] scene root at {:?}", scene);

  // --------------------------------------------------------------------
  // 2) Each mesh is a heap block holding the address of its GPU handle.
  //    The handle is not heap memory, so attaching a finalizer to it
  //    creates a zero-size block that dies with the mesh.
  // --------------------------------------------------------------------
  for id in 0..MESHES {
    let mesh = ctx.allocate(WORD * 2).expect("allocate mesh");
    let handle = create_gpu_handle(id as u32);

    ctx.attach_finalizer(handle, move |ptr| {
      // SAFETY: created by create_gpu_handle and released only here
      let id = unsafe { Box::from_raw(ptr.as_ptr() as *mut u32) };
      println!("    released gpu handle {}", id);
    })
    .expect("attach handle finalizer");

    unsafe {
      link(mesh, 0, handle);
      link(scene, id, mesh.as_ptr());
    }
  }
  println!(
    "[2] {} blocks, {} bytes live",
    ctx.block_count(),
    ctx.live_bytes()
  );

  // --------------------------------------------------------------------
  // 3) Frame loop: every eighth frame a mesh is removed from the scene,
  //    and the collector gets exactly one step per frame.
  // --------------------------------------------------------------------
  for frame in 0..48 {
    if frame % 8 == 0 && frame / 8 < MESHES {
      unsafe { link(scene, frame / 8, std::ptr::null()) };
      println!("[3] frame {frame}: dropped mesh {}", frame / 8);
    }

    match ctx.collect_step() {
      Ok(StepOutcome::Swept { purged }) if purged > 0 => {
        println!("[3] frame {frame}: swept {purged} blocks");
      }
      Ok(_) => {}
      Err(err) => eprintln!("[3] frame {frame}: {err}"),
    }
  }

  println!(
    "[4] {} blocks, {} bytes live, phase {:?}",
    ctx.block_count(),
    ctx.live_bytes(),
    ctx.phase()
  );

  // --------------------------------------------------------------------
  // 4) Teardown releases whatever is left.
  // --------------------------------------------------------------------
  let destroyed = ctx.destroy();
  println!("[5] destroyed {destroyed} blocks");
}
