pub mod fbx;
